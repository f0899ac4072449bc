//! Decoding of `ProcessQuery` responses.
//!
//! The body is a JSON array aligned with the submitted actions by position.
//! Entries carrying an `ErrorInfo` key are status records; anything else in
//! the array is a result payload, which the swap recipe does not consume.

use std::fmt::{self, Display, Formatter};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CsomError, CsomResult};

/// Message used when the service reports an error without any text.
const UNSPECIFIED_REMOTE_FAILURE: &str = "the service reported an unspecified error";

/// Remote messages recognised as caller mistakes, with the message shown instead.
const KNOWN_VALIDATION_FAILURES: &[(&str, &str)] = &[(
    "must be the root site or the search center site",
    "target url is not root site or search center.",
)];

/// Status record in a response array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEntry {
    /// Protocol schema version reported by the service.
    #[serde(default)]
    pub schema_version: Option<String>,
    /// Server library version.
    #[serde(default)]
    pub library_version: Option<String>,
    /// Structured error, `null` on success.
    pub error_info: Option<ErrorInfo>,
    /// Correlation id of the request.
    #[serde(default)]
    pub trace_correlation_id: Option<String>,
}

/// Structured error reported by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorInfo {
    /// Human-readable message; some faults carry none.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Optional machine value attached to the error.
    #[serde(default)]
    pub error_value: Option<Value>,
    /// Server-side exception type.
    #[serde(default)]
    pub error_type_name: Option<String>,
    /// Correlation id for support diagnosis.
    #[serde(default)]
    pub trace_correlation_id: Option<String>,
}

/// Outcome of one `ProcessQuery` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessQueryOutcome {
    /// Every status record was error-free.
    Succeeded {
        /// Correlation id of the last status record, if any.
        trace_correlation_id: Option<String>,
    },
    /// The first status record carrying an error.
    Failed(RemoteFailure),
}

/// Structured failure reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// The service rejected the caller's input in a recognised way.
    KnownValidation {
        /// Message shown to the user.
        message: String,
        /// Message as sent by the service.
        remote_message: String,
        /// Correlation id for support diagnosis.
        trace_correlation_id: Option<String>,
    },
    /// Any other remote failure, passed through verbatim.
    Unknown {
        /// Message as sent by the service.
        message: String,
        /// Server-side exception type.
        error_type_name: Option<String>,
        /// Optional machine value, rendered as JSON text.
        error_value: Option<String>,
        /// Correlation id for support diagnosis.
        trace_correlation_id: Option<String>,
    },
}

impl RemoteFailure {
    /// Correlation id attached to the failure.
    #[must_use]
    pub fn trace_correlation_id(&self) -> Option<&str> {
        match self {
            Self::KnownValidation {
                trace_correlation_id,
                ..
            }
            | Self::Unknown {
                trace_correlation_id,
                ..
            } => trace_correlation_id.as_deref(),
        }
    }
}

impl Display for RemoteFailure {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::KnownValidation { message, .. } | Self::Unknown { message, .. } => {
                formatter.write_str(message)
            }
        }
    }
}

/// Classify a remote error by matching its message against known patterns.
///
/// An error without a message is always [`RemoteFailure::Unknown`], described
/// by its exception type when the service sent one.
#[must_use]
pub fn classify_remote_failure(info: ErrorInfo, entry_trace: Option<String>) -> RemoteFailure {
    let trace_correlation_id = info.trace_correlation_id.or(entry_trace);
    let remote_message = info.error_message.filter(|message| !message.is_empty());
    let known = remote_message.as_deref().and_then(|message| {
        KNOWN_VALIDATION_FAILURES
            .iter()
            .find(|(pattern, _)| message.contains(pattern))
    });

    match (known, remote_message) {
        (Some((_, friendly)), Some(remote_message)) => RemoteFailure::KnownValidation {
            message: (*friendly).to_string(),
            remote_message,
            trace_correlation_id,
        },
        (_, remote_message) => RemoteFailure::Unknown {
            message: remote_message
                .or_else(|| info.error_type_name.clone())
                .unwrap_or_else(|| UNSPECIFIED_REMOTE_FAILURE.to_string()),
            error_type_name: info.error_type_name,
            error_value: info
                .error_value
                .filter(|value| !value.is_null())
                .map(|value| value.to_string()),
            trace_correlation_id,
        },
    }
}

/// Decode a raw response body, stopping at the first erroring entry.
///
/// # Errors
///
/// Returns [`CsomError::ResponseDecode`] when the body is not a JSON array or a
/// status record is malformed.
pub fn parse(raw: &str) -> CsomResult<ProcessQueryOutcome> {
    let elements: Vec<Value> =
        serde_json::from_str(raw).map_err(|source| CsomError::ResponseDecode { source })?;

    let mut trace_correlation_id = None;
    for element in elements {
        let is_entry = element
            .as_object()
            .is_some_and(|object| object.contains_key("ErrorInfo"));
        if !is_entry {
            continue;
        }

        let entry: ResponseEntry = serde_json::from_value(element)
            .map_err(|source| CsomError::ResponseDecode { source })?;
        if let Some(info) = entry.error_info {
            return Ok(ProcessQueryOutcome::Failed(classify_remote_failure(
                info,
                entry.trace_correlation_id,
            )));
        }
        if entry.trace_correlation_id.is_some() {
            trace_correlation_id = entry.trace_correlation_id;
        }
    }

    Ok(ProcessQueryOutcome::Succeeded {
        trace_correlation_id,
    })
}
