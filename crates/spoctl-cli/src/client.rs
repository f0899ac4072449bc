//! Shared client utilities, error types, and telemetry wiring for the CLI.

use std::fmt::{self, Display, Formatter};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use serde::Serialize;
use spoctl_csom::{CsomError, RemoteFailure};

use crate::cli::Cli;

pub(crate) const HEADER_REQUEST_ID: &str = "client-request-id";

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<CsomError> for CliError {
    fn from(err: CsomError) -> Self {
        if err.is_validation() {
            return Self::Validation(err.to_string());
        }
        if let CsomError::Remote(failure @ RemoteFailure::Unknown { .. }) = &err {
            if let Some(id) = failure.trace_correlation_id() {
                return Self::failure(anyhow!("{failure} (correlation id: {id})"));
            }
        }
        Self::failure(err)
    }
}

/// Dependencies constructed from environment flags and CLI options.
#[derive(Clone)]
pub(crate) struct CliDependencies {
    pub(crate) client: Client,
    pub(crate) telemetry: Option<TelemetryEmitter>,
}

impl CliDependencies {
    /// Construct a configured HTTP client and optional telemetry emitter.
    pub(crate) fn from_env(cli: &Cli, trace_id: &str) -> CliResult<Self> {
        let mut default_headers = HeaderMap::new();
        let request_id = HeaderValue::from_str(trace_id).map_err(|_| {
            CliError::failure(anyhow!("trace identifier contains invalid characters"))
        })?;
        default_headers.insert(HEADER_REQUEST_ID, request_id);

        let client = Client::builder()
            .timeout(Duration::from_secs(cli.timeout))
            .default_headers(default_headers)
            .build()
            .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            telemetry: TelemetryEmitter::from_env(),
        })
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) client: Client,
    pub(crate) tenant_url: Option<Url>,
    pub(crate) admin_url: Option<Url>,
    pub(crate) access_token: Option<String>,
    pub(crate) timeout: Duration,
}

/// Telemetry emitter used to forward CLI outcomes.
#[derive(Clone)]
pub(crate) struct TelemetryEmitter {
    pub(crate) client: Client,
    pub(crate) endpoint: Url,
}

impl TelemetryEmitter {
    #[must_use]
    pub(crate) fn from_env() -> Option<Self> {
        let endpoint = std::env::var("SPOCTL_TELEMETRY_ENDPOINT").ok()?;
        let endpoint = endpoint.parse().ok()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .ok()?;
        Some(Self { client, endpoint })
    }

    pub(crate) async fn emit(
        &self,
        trace_id: &str,
        command: &str,
        outcome: &str,
        exit_code: i32,
        message: Option<&str>,
    ) {
        let event = TelemetryEvent {
            command,
            outcome,
            trace_id,
            exit_code,
            message,
            timestamp_ms: timestamp_now_ms(),
        };

        if let Err(err) = self
            .client
            .post(self.endpoint.clone())
            .json(&event)
            .send()
            .await
        {
            tracing::debug!(error = %err, "telemetry emit failed");
        }
    }
}

#[derive(Serialize)]
struct TelemetryEvent<'a> {
    command: &'a str,
    outcome: &'a str,
    trace_id: &'a str,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    timestamp_ms: u64,
}

/// Parse a URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

/// Normalise the access token supplied by the external session.
pub(crate) fn parse_access_token(input: Option<String>) -> CliResult<Option<String>> {
    let Some(raw) = input else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::validation("access token cannot be an empty string"));
    }
    Ok(Some(trimmed.to_string()))
}

/// Millisecond timestamp helper for telemetry.
#[must_use]
pub(crate) fn timestamp_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn telemetry_emitter_emits_event() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/telemetry");
            then.status(200);
        });

        let emitter = TelemetryEmitter {
            client: Client::new(),
            endpoint: format!("{}/telemetry", server.base_url())
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid URL"))?,
        };

        emitter
            .emit("trace", "site_swap", "error", 3, Some("message"))
            .await;

        mock.assert();
        Ok(())
    }

    #[test]
    fn parse_access_token_rejects_blank_values() {
        let err = parse_access_token(Some("   ".to_string()));
        assert!(
            matches!(err, Err(CliError::Validation(message)) if message.contains("cannot be an empty"))
        );
    }

    #[test]
    fn parse_access_token_trims_value() -> CliResult<()> {
        assert_eq!(
            parse_access_token(Some(" token \n".to_string()))?,
            Some("token".to_string())
        );
        assert_eq!(parse_access_token(None)?, None);
        Ok(())
    }

    #[test]
    fn remote_known_validation_maps_to_validation_exit_code() {
        let err = CliError::from(CsomError::Remote(RemoteFailure::KnownValidation {
            message: "target url is not root site or search center.".to_string(),
            remote_message: "The target URL must be the root site or the search center site"
                .to_string(),
            trace_correlation_id: None,
        }));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.display_message(),
            "target url is not root site or search center."
        );
    }

    #[test]
    fn unknown_remote_failure_includes_correlation_id() {
        let err = CliError::from(CsomError::Remote(RemoteFailure::Unknown {
            message: "Access denied.".to_string(),
            error_type_name: None,
            error_value: None,
            trace_correlation_id: Some("abc-123".to_string()),
        }));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.display_message(),
            "Access denied. (correlation id: abc-123)"
        );
    }

    #[test]
    fn transport_failures_map_to_failure_exit_code() {
        let err = CliError::from(CsomError::Http {
            operation: "ProcessQuery",
            status: StatusCode::BAD_GATEWAY,
        });
        assert_eq!(err.exit_code(), 3);
        assert!(err.display_message().contains("502"));
    }
}
