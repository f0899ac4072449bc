//! Output renderers for verbose command output.

use anyhow::anyhow;
use serde::Serialize;
use spoctl_csom::SwapReport;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

const DONE_MARKER: &str = "DONE";

#[derive(Serialize)]
struct SwapReportView<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_correlation_id: Option<&'a str>,
    stages: Vec<String>,
}

pub(crate) fn render_swap_report(report: &SwapReport, format: OutputFormat) -> CliResult<()> {
    let text = format_swap_report(report, format)?;
    println!("{text}");
    Ok(())
}

pub(crate) fn format_swap_report(report: &SwapReport, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Text => Ok(DONE_MARKER.to_string()),
        OutputFormat::Json => {
            let view = SwapReportView {
                status: DONE_MARKER,
                trace_correlation_id: report.trace_correlation_id.as_deref(),
                stages: report.stages.iter().map(ToString::to_string).collect(),
            };
            serde_json::to_string_pretty(&view)
                .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
        }
    }
}
