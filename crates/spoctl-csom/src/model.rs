//! In-memory call graph for object-path requests.
//!
//! A request is two ordered sequences: object paths (constructors and method
//! calls that reference each other by id) and actions (which materialize or
//! query those paths). The service correlates results with actions purely by
//! position, so both sequences are kept as vectors in submission order.

use std::fmt::{self, Display, Formatter};

use crate::error::{CsomError, CsomResult};

/// Identifier of an object-path node within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPathId(u32);

impl ObjectPathId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for ObjectPathId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier of an action within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(u32);

impl ActionId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for ActionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Typed method parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Text value.
    String(String),
    /// Boolean value rendered as `true` / `false`.
    Boolean(bool),
    /// Integral value rendered in decimal.
    Number(i64),
}

impl ParameterValue {
    /// Type tag written on the `Parameter` element.
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::Boolean(_) => "Boolean",
            Self::Number(_) => "Number",
        }
    }

    /// Literal text content, before XML escaping.
    #[must_use]
    pub fn literal(&self) -> String {
        match self {
            Self::String(value) => value.clone(),
            Self::Boolean(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
        }
    }
}

/// Node of the object-path graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectPathNode {
    /// Instantiates a remote object of a fixed type.
    Constructor {
        /// Node id.
        id: ObjectPathId,
        /// Identifier of the remote type.
        type_id: String,
    },
    /// Invokes a method on the instance produced by `parent_id`.
    Method {
        /// Node id.
        id: ObjectPathId,
        /// Node whose instance receives the call.
        parent_id: ObjectPathId,
        /// Remote method name.
        name: String,
        /// Ordered parameters.
        parameters: Vec<ParameterValue>,
    },
}

impl ObjectPathNode {
    /// Id of this node.
    #[must_use]
    pub const fn id(&self) -> ObjectPathId {
        match self {
            Self::Constructor { id, .. } | Self::Method { id, .. } => *id,
        }
    }
}

/// Top-level request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionNode {
    /// Materializes an object path.
    ObjectPath {
        /// Action id.
        id: ActionId,
        /// Target node.
        object_path_id: ObjectPathId,
    },
    /// Requests the properties of an object path's result.
    Query {
        /// Action id.
        id: ActionId,
        /// Target node.
        object_path_id: ObjectPathId,
        /// Whether every property is selected.
        select_all_properties: bool,
    },
}

impl ActionNode {
    /// Id of this action.
    #[must_use]
    pub const fn id(&self) -> ActionId {
        match self {
            Self::ObjectPath { id, .. } | Self::Query { id, .. } => *id,
        }
    }

    /// Node targeted by this action.
    #[must_use]
    pub const fn object_path_id(&self) -> ObjectPathId {
        match self {
            Self::ObjectPath { object_path_id, .. } | Self::Query { object_path_id, .. } => {
                *object_path_id
            }
        }
    }
}

/// Immutable request graph handed to the serializer.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestGraph {
    object_paths: Vec<ObjectPathNode>,
    actions: Vec<ActionNode>,
}

impl RequestGraph {
    /// Assemble a graph from raw parts without checking invariants.
    ///
    /// Prefer [`GraphBuilder`]; graphs created here are re-checked by
    /// [`RequestGraph::validate`] before serialization.
    #[must_use]
    pub const fn from_parts(object_paths: Vec<ObjectPathNode>, actions: Vec<ActionNode>) -> Self {
        Self {
            object_paths,
            actions,
        }
    }

    /// Object paths in ascending id order.
    #[must_use]
    pub fn object_paths(&self) -> &[ObjectPathNode] {
        &self.object_paths
    }

    /// Actions in submission order.
    #[must_use]
    pub fn actions(&self) -> &[ActionNode] {
        &self.actions
    }

    /// Check id monotonicity and reference integrity.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::MalformedGraph`] naming the first violation.
    pub fn validate(&self) -> CsomResult<()> {
        let mut previous: Option<ObjectPathId> = None;
        for (index, node) in self.object_paths.iter().enumerate() {
            check_object_path(previous, node)?;
            if let ObjectPathNode::Method { id, parent_id, .. } = node {
                let defined = self.object_paths[..index]
                    .iter()
                    .any(|earlier| earlier.id() == *parent_id);
                if !defined {
                    return Err(CsomError::malformed(format!(
                        "method {id} references undefined parent {parent_id}"
                    )));
                }
            }
            previous = Some(node.id());
        }

        let mut previous: Option<ActionId> = None;
        for action in &self.actions {
            check_action(previous, action, &self.object_paths)?;
            previous = Some(action.id());
        }
        Ok(())
    }
}

fn check_object_path(previous: Option<ObjectPathId>, node: &ObjectPathNode) -> CsomResult<()> {
    let id = node.id();
    if id.get() == 0 {
        return Err(CsomError::malformed("object path ids must be positive"));
    }
    if previous.is_some_and(|prev| id <= prev) {
        return Err(CsomError::malformed(format!(
            "object path id {id} is not greater than the previous id"
        )));
    }
    if let ObjectPathNode::Method { parent_id, .. } = node {
        if *parent_id >= id {
            return Err(CsomError::malformed(format!(
                "method {id} references parent {parent_id} which is not defined before it"
            )));
        }
    }
    Ok(())
}

fn check_action(
    previous: Option<ActionId>,
    action: &ActionNode,
    object_paths: &[ObjectPathNode],
) -> CsomResult<()> {
    let id = action.id();
    if id.get() == 0 {
        return Err(CsomError::malformed("action ids must be positive"));
    }
    if previous.is_some_and(|prev| id <= prev) {
        return Err(CsomError::malformed(format!(
            "action id {id} is not greater than the previous id"
        )));
    }
    let target = action.object_path_id();
    if !object_paths.iter().any(|node| node.id() == target) {
        return Err(CsomError::malformed(format!(
            "action {id} targets undefined object path {target}"
        )));
    }
    Ok(())
}

/// Incremental builder that rejects invariant violations as they happen.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    object_paths: Vec<ObjectPathNode>,
    actions: Vec<ActionNode>,
}

impl GraphBuilder {
    /// Start an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constructor node.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::MalformedGraph`] when `id` does not increase.
    pub fn constructor(
        &mut self,
        id: ObjectPathId,
        type_id: impl Into<String>,
    ) -> CsomResult<&mut Self> {
        self.push_object_path(ObjectPathNode::Constructor {
            id,
            type_id: type_id.into(),
        })
    }

    /// Add a method node invoked on `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::MalformedGraph`] when `id` does not increase or the
    /// parent has not been defined.
    pub fn method(
        &mut self,
        id: ObjectPathId,
        parent_id: ObjectPathId,
        name: impl Into<String>,
        parameters: Vec<ParameterValue>,
    ) -> CsomResult<&mut Self> {
        if !self.object_paths.iter().any(|node| node.id() == parent_id) {
            return Err(CsomError::malformed(format!(
                "method {id} references undefined parent {parent_id}"
            )));
        }
        self.push_object_path(ObjectPathNode::Method {
            id,
            parent_id,
            name: name.into(),
            parameters,
        })
    }

    /// Add an action materializing `object_path_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::MalformedGraph`] when `id` does not increase or the
    /// target is undefined.
    pub fn object_path_action(
        &mut self,
        id: ActionId,
        object_path_id: ObjectPathId,
    ) -> CsomResult<&mut Self> {
        self.push_action(ActionNode::ObjectPath { id, object_path_id })
    }

    /// Add an action querying the result of `object_path_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::MalformedGraph`] when `id` does not increase or the
    /// target is undefined.
    pub fn query_action(
        &mut self,
        id: ActionId,
        object_path_id: ObjectPathId,
        select_all_properties: bool,
    ) -> CsomResult<&mut Self> {
        self.push_action(ActionNode::Query {
            id,
            object_path_id,
            select_all_properties,
        })
    }

    /// Finish the graph.
    #[must_use]
    pub fn build(self) -> RequestGraph {
        RequestGraph::from_parts(self.object_paths, self.actions)
    }

    fn push_object_path(&mut self, node: ObjectPathNode) -> CsomResult<&mut Self> {
        check_object_path(self.object_paths.last().map(ObjectPathNode::id), &node)?;
        self.object_paths.push(node);
        Ok(self)
    }

    fn push_action(&mut self, action: ActionNode) -> CsomResult<&mut Self> {
        check_action(
            self.actions.last().map(ActionNode::id),
            &action,
            &self.object_paths,
        )?;
        self.actions.push(action);
        Ok(self)
    }
}
