//! Error types for object-path requests and the site swap operation.
//!
//! # Design
//!
//! - Every failure surfaces to the caller; nothing in this crate retries or
//!   swallows an error.
//! - Validation messages are user-facing and rendered verbatim by the CLI.
//! - Transport errors keep their source so callers can inspect them.

use reqwest::StatusCode;
use thiserror::Error;

use crate::operation::SwapStage;
use crate::response::RemoteFailure;

/// Result type for object-path operations.
pub type CsomResult<T> = Result<T, CsomError>;

/// Errors produced while building, sending, or decoding object-path requests.
#[derive(Debug, Error)]
pub enum CsomError {
    /// Input was missing or invalid; raised before any network call.
    #[error("{message}")]
    Validation {
        /// Option that failed validation.
        field: &'static str,
        /// User-facing description of the problem.
        message: String,
    },
    /// The request digest could not be acquired (expired or absent session).
    #[error("failed to acquire request digest: {detail}")]
    Auth {
        /// HTTP status returned by the context endpoint, when one was received.
        status: Option<StatusCode>,
        /// Description of the failure.
        detail: String,
    },
    /// The HTTP exchange failed before a response was received.
    #[error("request to {operation} failed")]
    Network {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// The remote endpoint answered with a non-success status.
    #[error("request to {operation} failed with status {status}")]
    Http {
        /// Operation identifier.
        operation: &'static str,
        /// Status returned by the endpoint.
        status: StatusCode,
    },
    /// A network stage exceeded its deadline.
    #[error("{stage} timed out")]
    Timeout {
        /// Stage that was running when the deadline elapsed.
        stage: SwapStage,
    },
    /// The caller cancelled the operation.
    #[error("{stage} was cancelled")]
    Cancelled {
        /// Stage that was running when cancellation was observed.
        stage: SwapStage,
    },
    /// The remote service executed the call and reported a structured error.
    #[error("{0}")]
    Remote(RemoteFailure),
    /// The call graph violated its id or reference invariants.
    #[error("malformed request graph: {reason}")]
    MalformedGraph {
        /// Invariant that was violated.
        reason: String,
    },
    /// The response body could not be decoded after a successful send.
    #[error("could not decode the service response; the operation may already have been applied")]
    ResponseDecode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl CsomError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedGraph {
            reason: reason.into(),
        }
    }

    /// Whether the failure was caused by caller input, locally or as reported
    /// by the remote service.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Remote(RemoteFailure::KnownValidation { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_renders_message_verbatim() {
        let err = CsomError::validation("sourceUrl", "Required source url is missing");
        assert_eq!(err.to_string(), "Required source url is missing");
        assert!(err.is_validation());
    }

    #[test]
    fn stage_errors_name_the_stage() {
        let err = CsomError::Timeout {
            stage: SwapStage::AcquiringDigest,
        };
        assert_eq!(err.to_string(), "acquiring digest timed out");

        let err = CsomError::Cancelled {
            stage: SwapStage::Sending,
        };
        assert_eq!(err.to_string(), "sending was cancelled");
        assert!(!err.is_validation());
    }

    #[test]
    fn http_error_carries_status() {
        let err = CsomError::Http {
            operation: "ProcessQuery",
            status: StatusCode::FORBIDDEN,
        };
        assert_eq!(
            err.to_string(),
            "request to ProcessQuery failed with status 403 Forbidden"
        );
    }
}
