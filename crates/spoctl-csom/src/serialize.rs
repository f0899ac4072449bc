//! Renders a [`RequestGraph`] into the exact XML document the service accepts.
//!
//! The service rejects anything other than this layout (attribute order,
//! self-closing spacing, no inter-element whitespace) as a malformed request,
//! so the document is written by hand rather than through a generic XML
//! writer.

use crate::error::CsomResult;
use crate::model::{ActionNode, ObjectPathNode, ParameterValue, RequestGraph};

/// Client application name declared on the request root.
pub const APPLICATION_NAME: &str = "SharePoint Online PowerShell (16.0.20414.0)";

const REQUEST_OPEN_PREFIX: &str =
    r#"<Request AddExpandoFieldTypeSuffix="true" SchemaVersion="15.0.0.0" LibraryVersion="16.0.0.0" ApplicationName=""#;
const REQUEST_NAMESPACE: &str = "http://schemas.microsoft.com/sharepoint/clientquery/2009";

/// Serialize a graph.
///
/// # Errors
///
/// Returns [`crate::CsomError::MalformedGraph`] when the graph violates its id
/// or reference invariants.
pub fn serialize(graph: &RequestGraph) -> CsomResult<String> {
    graph.validate()?;

    let mut out = String::with_capacity(1024);
    out.push_str(REQUEST_OPEN_PREFIX);
    out.push_str(&xml_escape(APPLICATION_NAME));
    out.push_str(r#"" xmlns=""#);
    out.push_str(REQUEST_NAMESPACE);
    out.push_str(r#"">"#);

    out.push_str("<Actions>");
    for action in graph.actions() {
        write_action(&mut out, action);
    }
    out.push_str("</Actions>");

    out.push_str("<ObjectPaths>");
    for node in graph.object_paths() {
        write_object_path(&mut out, node);
    }
    out.push_str("</ObjectPaths>");

    out.push_str("</Request>");
    Ok(out)
}

fn write_action(out: &mut String, action: &ActionNode) {
    match action {
        ActionNode::ObjectPath { id, object_path_id } => {
            out.push_str(&format!(
                r#"<ObjectPath Id="{id}" ObjectPathId="{object_path_id}" />"#
            ));
        }
        ActionNode::Query {
            id,
            object_path_id,
            select_all_properties,
        } => {
            out.push_str(&format!(
                r#"<Query Id="{id}" ObjectPathId="{object_path_id}"><Query SelectAllProperties="{select_all_properties}"><Properties /></Query></Query>"#
            ));
        }
    }
}

fn write_object_path(out: &mut String, node: &ObjectPathNode) {
    match node {
        ObjectPathNode::Constructor { id, type_id } => {
            out.push_str(&format!(
                r#"<Constructor Id="{id}" TypeId="{}" />"#,
                xml_escape(type_id)
            ));
        }
        ObjectPathNode::Method {
            id,
            parent_id,
            name,
            parameters,
        } => {
            out.push_str(&format!(
                r#"<Method Id="{id}" ParentId="{parent_id}" Name="{}">"#,
                xml_escape(name)
            ));
            out.push_str("<Parameters>");
            for parameter in parameters {
                write_parameter(out, parameter);
            }
            out.push_str("</Parameters></Method>");
        }
    }
}

fn write_parameter(out: &mut String, parameter: &ParameterValue) {
    out.push_str(&format!(
        r#"<Parameter Type="{}">{}</Parameter>"#,
        parameter.type_tag(),
        xml_escape(&parameter.literal())
    ));
}

/// Escape text for use in XML content or attribute values.
#[must_use]
pub fn xml_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
