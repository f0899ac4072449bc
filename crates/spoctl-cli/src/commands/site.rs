use std::sync::Arc;

use spoctl_csom::{
    AuthenticatedOperation, CancelHandle, HttpTransport, OperationControl, ProtocolRpcOperation,
    SiteSwapOperation, SiteSwapOptions, SiteUrlField, TenantContext,
};
use tokio::signal;

use crate::cli::{OutputFormat, SiteSwapArgs};
use crate::client::{AppContext, CliResult};
use crate::output::render_swap_report;

pub(crate) async fn handle_site_swap(
    ctx: &AppContext,
    args: SiteSwapArgs,
    verbose: bool,
    format: OutputFormat,
) -> CliResult<()> {
    let options = SiteSwapOptions {
        source_url: args.source_url,
        target_url: args.target_url,
        archive_url: args.archive_url,
        disable_redirection: args.disable_redirection,
        wait: args.wait,
    };

    let tenant = match &ctx.tenant_url {
        Some(root) => TenantContext::new(root.clone()),
        None => TenantContext::from_site_url(SiteUrlField::Source, options.source_url.as_deref())?,
    }
    .with_admin_override(ctx.admin_url.clone());

    let transport = Arc::new(HttpTransport::new(
        ctx.client.clone(),
        ctx.access_token.clone(),
    ));
    let operation = SiteSwapOperation::new(
        tenant.clone(),
        AuthenticatedOperation::new(Arc::new(tenant), transport.clone()),
        ProtocolRpcOperation::new(transport),
    );

    let (cancel, cancel_signal) = CancelHandle::new();
    let interrupt = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling site swap");
            cancel.cancel();
        }
    });

    let control = OperationControl::new()
        .with_timeout(ctx.timeout)
        .with_cancel(cancel_signal);
    let result = operation.run(&options, &control).await;
    interrupt.abort();

    let report = result?;
    if verbose {
        render_swap_report(&report, format)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CliError;
    use anyhow::{Result, anyhow};
    use httpmock::prelude::*;
    use reqwest::{Client, Url};
    use serde_json::json;
    use std::time::Duration;

    const SOURCE: &str = "https://contoso.sharepoint.com/sites/sourcesite";
    const ARCHIVE: &str = "https://contoso.sharepoint.com/sites/root-archive";

    fn context(server: &MockServer) -> Result<AppContext> {
        Ok(AppContext {
            client: Client::new(),
            tenant_url: None,
            admin_url: Some(Url::parse(&server.base_url())?),
            access_token: Some("session-token".to_string()),
            timeout: Duration::from_secs(5),
        })
    }

    fn args(target: &str) -> SiteSwapArgs {
        SiteSwapArgs {
            source_url: Some(SOURCE.to_string()),
            target_url: Some(target.to_string()),
            archive_url: Some(ARCHIVE.to_string()),
            disable_redirection: false,
            wait: false,
        }
    }

    fn mock_digest(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).path("/_api/contextinfo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "FormDigestValue": "ABC" }));
        })
    }

    fn mock_process_query<'a>(
        server: &'a MockServer,
        body: &serde_json::Value,
    ) -> httpmock::Mock<'a> {
        let body = body.to_string();
        server.mock(move |when, then| {
            when.method(POST)
                .path("/_vti_bin/client.svc/ProcessQuery")
                .header("x-requestdigest", "ABC");
            then.status(200).body(body.as_str());
        })
    }

    #[tokio::test]
    async fn swap_succeeds_without_output() -> Result<()> {
        let server = MockServer::start_async().await;
        let digest = mock_digest(&server);
        let process = mock_process_query(
            &server,
            &json!([{ "SchemaVersion": "15.0.0.0", "ErrorInfo": null, "TraceCorrelationId": "t-1" }]),
        );

        handle_site_swap(
            &context(&server)?,
            args("https://contoso.sharepoint.com/"),
            false,
            OutputFormat::Text,
        )
        .await
        .map_err(|err| anyhow!(err.display_message()))?;

        digest.assert();
        process.assert();
        Ok(())
    }

    #[tokio::test]
    async fn known_remote_failure_is_validation_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let _digest = mock_digest(&server);
        let _process = mock_process_query(
            &server,
            &json!([{
                "SchemaVersion": "15.0.0.0",
                "ErrorInfo": {
                    "ErrorMessage": "The target URL must be the root site or the search center site",
                    "ErrorValue": null,
                    "ErrorTypeName": "Microsoft.Online.SharePoint.Common.SpoException",
                    "TraceCorrelationId": "t-2"
                },
                "TraceCorrelationId": "t-2"
            }]),
        );

        let err = handle_site_swap(
            &context(&server)?,
            args("https://contoso.sharepoint.com/not-a-root-site"),
            false,
            OutputFormat::Text,
        )
        .await
        .err()
        .ok_or_else(|| anyhow!("swap should fail"))?;

        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.display_message(),
            "target url is not root site or search center."
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_remote_failure_reports_correlation_id() -> Result<()> {
        let server = MockServer::start_async().await;
        let _digest = mock_digest(&server);
        let _process = mock_process_query(
            &server,
            &json!([{
                "SchemaVersion": "15.0.0.0",
                "ErrorInfo": {
                    "ErrorMessage": "Access denied.",
                    "ErrorValue": null,
                    "ErrorTypeName": "System.UnauthorizedAccessException",
                    "TraceCorrelationId": "t-3"
                },
                "TraceCorrelationId": "t-3"
            }]),
        );

        let err = handle_site_swap(
            &context(&server)?,
            args("https://contoso.sharepoint.com/"),
            false,
            OutputFormat::Text,
        )
        .await
        .err()
        .ok_or_else(|| anyhow!("swap should fail"))?;

        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "Access denied. (correlation id: t-3)");
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_fails_before_any_request() -> Result<()> {
        let server = MockServer::start_async().await;
        let digest = mock_digest(&server);

        let mut swap_args = args("https://contoso.sharepoint.com/");
        swap_args.source_url = None;
        let err = handle_site_swap(&context(&server)?, swap_args, false, OutputFormat::Text)
            .await
            .err()
            .ok_or_else(|| anyhow!("swap should fail"))?;

        assert!(
            matches!(&err, CliError::Validation(message) if message == "Required source url is missing")
        );
        digest.assert_calls(0);
        Ok(())
    }
}
