//! HTTP seams of the protocol: digest acquisition and `ProcessQuery` posts.
//!
//! Neither operation retries. A swap that reached the service may already
//! have been applied, so retry policy belongs to whoever invokes the whole
//! operation again.

use std::fmt::{self, Debug, Formatter};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{CsomError, CsomResult};
use crate::operation::SwapStage;

/// Header carrying the anti-forgery digest.
pub const HEADER_REQUEST_DIGEST: &str = "x-requestdigest";

const CONTEXT_INFO_PATH: &str = "_api/contextinfo";
const PROCESS_QUERY_PATH: &str = "_vti_bin/client.svc/ProcessQuery";
const ODATA_NO_METADATA: &str = "application/json;odata=nometadata";

/// Short-lived anti-forgery token.
#[derive(Clone, PartialEq, Eq)]
pub struct DigestToken(String);

impl DigestToken {
    /// Wrap a digest value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value for the request header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for DigestToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("DigestToken(<redacted>)")
    }
}

/// Obtains request digests from the administrative endpoint.
#[async_trait]
pub trait DigestProvider: Send + Sync {
    /// Acquire a fresh digest for `admin_url`.
    async fn acquire(&self, admin_url: &Url) -> CsomResult<DigestToken>;
}

/// Posts serialized object-path documents.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Send `document` to the administrative endpoint and return the raw body.
    async fn send(&self, admin_url: &Url, digest: &DigestToken, document: String)
    -> CsomResult<String>;
}

/// `contextinfo` endpoint for an administrative URL.
///
/// # Errors
///
/// Returns [`CsomError::Validation`] when the URL cannot be joined.
pub fn context_info_endpoint(admin_url: &Url) -> CsomResult<Url> {
    join_endpoint(admin_url, CONTEXT_INFO_PATH)
}

/// `ProcessQuery` endpoint for an administrative URL.
///
/// # Errors
///
/// Returns [`CsomError::Validation`] when the URL cannot be joined.
pub fn process_query_endpoint(admin_url: &Url) -> CsomResult<Url> {
    join_endpoint(admin_url, PROCESS_QUERY_PATH)
}

fn join_endpoint(admin_url: &Url, path: &str) -> CsomResult<Url> {
    admin_url
        .join(path)
        .map_err(|err| CsomError::validation("adminUrl", format!("invalid admin URL: {err}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContextInfo {
    form_digest_value: Option<String>,
    #[serde(default)]
    form_digest_timeout_seconds: Option<u64>,
}

/// reqwest-backed implementation of both protocol seams.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    access_token: Option<String>,
}

impl HttpTransport {
    /// Wrap a configured client; `access_token` is sent as a bearer credential.
    #[must_use]
    pub const fn new(client: Client, access_token: Option<String>) -> Self {
        Self {
            client,
            access_token,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl Debug for HttpTransport {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpTransport")
            .field("authenticated", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DigestProvider for HttpTransport {
    async fn acquire(&self, admin_url: &Url) -> CsomResult<DigestToken> {
        let url = context_info_endpoint(admin_url)?;
        let response = self
            .authorize(self.client.post(url))
            .header(ACCEPT, ODATA_NO_METADATA)
            .body("")
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    CsomError::Timeout {
                        stage: SwapStage::AcquiringDigest,
                    }
                } else {
                    CsomError::Auth {
                        status: None,
                        detail: format!("context info request failed: {err}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CsomError::Auth {
                status: Some(status),
                detail: format!("context info endpoint returned {status}"),
            });
        }

        let info = response
            .json::<ContextInfo>()
            .await
            .map_err(|err| CsomError::Auth {
                status: Some(status),
                detail: format!("context info response was not valid JSON: {err}"),
            })?;

        let digest = info
            .form_digest_value
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CsomError::Auth {
                status: Some(status),
                detail: "context info response did not include a form digest".to_string(),
            })?;

        debug!(
            timeout_secs = info.form_digest_timeout_seconds,
            "acquired request digest"
        );
        Ok(DigestToken::new(digest))
    }
}

#[async_trait]
impl ProtocolClient for HttpTransport {
    async fn send(
        &self,
        admin_url: &Url,
        digest: &DigestToken,
        document: String,
    ) -> CsomResult<String> {
        let url = process_query_endpoint(admin_url)?;
        let response = self
            .authorize(self.client.post(url))
            .header(CONTENT_TYPE, "text/xml")
            .header(ACCEPT, "application/json")
            .header(HEADER_REQUEST_DIGEST, digest.expose())
            .body(document)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    CsomError::Timeout {
                        stage: SwapStage::Sending,
                    }
                } else {
                    CsomError::Network {
                        operation: "ProcessQuery",
                        source,
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CsomError::Http {
                operation: "ProcessQuery",
                status,
            });
        }

        response.text().await.map_err(|source| CsomError::Network {
            operation: "ProcessQuery",
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use httpmock::prelude::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn admin_url(server: &MockServer) -> Result<Url> {
        Url::parse(&format!("{}/", server.base_url())).map_err(|err| anyhow!("{err}"))
    }

    #[tokio::test]
    async fn acquires_digest_with_bearer_token() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/_api/contextinfo")
                .header("authorization", "Bearer session-token")
                .header("accept", ODATA_NO_METADATA);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "FormDigestValue": "ABC",
                    "FormDigestTimeoutSeconds": 1800
                }));
        });

        let transport = HttpTransport::new(Client::new(), Some("session-token".to_string()));
        let digest = transport.acquire(&admin_url(&server)?).await?;

        assert_eq!(digest.expose(), "ABC");
        assert_eq!(format!("{digest:?}"), "DigestToken(<redacted>)");
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_is_auth_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/_api/contextinfo");
            then.status(401);
        });

        let transport = HttpTransport::new(Client::new(), None);
        let result = transport.acquire(&admin_url(&server)?).await;

        assert!(matches!(
            result,
            Err(CsomError::Auth {
                status: Some(StatusCode::UNAUTHORIZED),
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_digest_value_is_auth_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/_api/contextinfo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "FormDigestValue": "" }));
        });

        let transport = HttpTransport::new(Client::new(), None);
        let result = transport.acquire(&admin_url(&server)?).await;
        assert!(matches!(result, Err(CsomError::Auth { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn posts_document_with_digest_header() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/_vti_bin/client.svc/ProcessQuery")
                .header(HEADER_REQUEST_DIGEST, "ABC")
                .header("content-type", "text/xml")
                .body("<Request />");
            then.status(200).body("[]");
        });

        let transport = HttpTransport::new(Client::new(), None);
        let body = transport
            .send(
                &admin_url(&server)?,
                &DigestToken::new("ABC"),
                "<Request />".to_string(),
            )
            .await?;

        assert_eq!(body, "[]");
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() -> Result<()> {
        let server = MockServer::start_async().await;
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/_vti_bin/client.svc/ProcessQuery");
            then.status(500);
        });

        let transport = HttpTransport::new(Client::new(), None);
        let result = transport
            .send(
                &admin_url(&server)?,
                &DigestToken::new("ABC"),
                "<Request />".to_string(),
            )
            .await;

        assert!(matches!(
            result,
            Err(CsomError::Http {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn endpoints_join_relative_to_admin_root() -> Result<()> {
        let admin = Url::parse("https://contoso-admin.sharepoint.com/")?;
        assert_eq!(
            process_query_endpoint(&admin)?.as_str(),
            "https://contoso-admin.sharepoint.com/_vti_bin/client.svc/ProcessQuery"
        );
        assert_eq!(
            context_info_endpoint(&admin)?.as_str(),
            "https://contoso-admin.sharepoint.com/_api/contextinfo"
        );
        Ok(())
    }
}
