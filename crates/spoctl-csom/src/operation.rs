//! Site swap orchestration.
//!
//! # Design
//!
//! - A strictly forward state machine: validate, resolve the admin endpoint,
//!   acquire a digest, send, parse. The first failure ends the run.
//! - Authentication (endpoint + digest) and protocol invocation (build,
//!   serialize, send) are separate capabilities composed by the operation.
//! - Only the two network stages suspend; both race the caller's
//!   cancellation signal and per-call timeout.
//! - Nothing is retried. Each run builds its own graph and digest, so runs
//!   share no mutable state and may execute concurrently.

use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{Instrument, debug, field, info, info_span, warn};
use url::Url;

use crate::error::{CsomError, CsomResult};
use crate::model::RequestGraph;
use crate::recipe::{SiteSwapRequest, build_site_swap_request};
use crate::response::{ProcessQueryOutcome, parse};
use crate::serialize::serialize;
use crate::tenant::{AdminUrlResolver, SiteUrlField, TenantContext};
use crate::transport::{DigestProvider, DigestToken, ProtocolClient};

/// Stages of a site swap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStage {
    /// Checking the three site URLs.
    Validating,
    /// Determining the administrative endpoint.
    ResolvingAdminUrl,
    /// Fetching a request digest.
    AcquiringDigest,
    /// Building, serializing, and posting the request.
    Sending,
    /// Decoding the response.
    Parsing,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
}

impl Display for SwapStage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Validating => "validating",
            Self::ResolvingAdminUrl => "resolving admin url",
            Self::AcquiringDigest => "acquiring digest",
            Self::Sending => "sending",
            Self::Parsing => "parsing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// Raw command options for a swap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteSwapOptions {
    /// `--sourceUrl`
    pub source_url: Option<String>,
    /// `--targetUrl`
    pub target_url: Option<String>,
    /// `--archiveUrl`
    pub archive_url: Option<String>,
    /// `--disableRedirection`
    pub disable_redirection: bool,
    /// `--wait`
    pub wait: bool,
}

/// Summary of a successful swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    /// Correlation id reported by the service.
    pub trace_correlation_id: Option<String>,
    /// Stages visited, ending with [`SwapStage::Succeeded`].
    pub stages: Vec<SwapStage>,
}

/// Triggers cancellation of every operation holding the paired signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create a handle and the signal it controls.
    #[must_use]
    pub fn new() -> (Self, CancelSignal) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            CancelSignal { receiver },
        )
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    async fn cancelled(mut self) {
        let closed = self.receiver.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            // Handle dropped without cancelling.
            std::future::pending::<()>().await;
        }
    }
}

/// Caller-supplied limits for the network stages.
#[derive(Debug, Clone, Default)]
pub struct OperationControl {
    timeout: Option<Duration>,
    cancel: Option<CancelSignal>,
}

impl OperationControl {
    /// No deadline and no cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each network call by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort network calls when `signal` fires.
    #[must_use]
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    async fn guard<T, F>(&self, stage: SwapStage, call: F) -> CsomResult<T>
    where
        F: Future<Output = CsomResult<T>>,
    {
        let cancel = self.cancel.clone();
        let cancelled = async move {
            match cancel {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(CsomError::Timeout { stage }),
                },
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(CsomError::Cancelled { stage }),
            result = bounded => result,
        }
    }
}

/// Capability: resolve the admin endpoint and acquire digests for it.
#[derive(Clone)]
pub struct AuthenticatedOperation {
    resolver: Arc<dyn AdminUrlResolver>,
    digests: Arc<dyn DigestProvider>,
}

impl AuthenticatedOperation {
    /// Compose a resolver with a digest provider.
    #[must_use]
    pub fn new(resolver: Arc<dyn AdminUrlResolver>, digests: Arc<dyn DigestProvider>) -> Self {
        Self { resolver, digests }
    }

    /// Administrative endpoint for this tenant.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's error.
    pub async fn resolve_admin_url(&self) -> CsomResult<Url> {
        self.resolver.resolve_admin_url().await
    }

    /// Fresh digest for `admin_url`; never cached.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error.
    pub async fn acquire_digest(&self, admin_url: &Url) -> CsomResult<DigestToken> {
        self.digests.acquire(admin_url).await
    }
}

/// Capability: serialize a call graph and post it.
#[derive(Clone)]
pub struct ProtocolRpcOperation {
    client: Arc<dyn ProtocolClient>,
}

impl ProtocolRpcOperation {
    /// Wrap a protocol client.
    #[must_use]
    pub fn new(client: Arc<dyn ProtocolClient>) -> Self {
        Self { client }
    }

    /// Serialize `graph` and send it with `digest`, returning the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::MalformedGraph`] for an invalid graph, or the
    /// client's transport error.
    pub async fn invoke(
        &self,
        admin_url: &Url,
        digest: &DigestToken,
        graph: &RequestGraph,
    ) -> CsomResult<String> {
        let document = serialize(graph)?;
        debug!(bytes = document.len(), "posting object-path request");
        self.client.send(admin_url, digest, document).await
    }
}

/// Swaps a site into another site's location, archiving the displaced site.
#[derive(Clone)]
pub struct SiteSwapOperation {
    tenant: TenantContext,
    auth: AuthenticatedOperation,
    rpc: ProtocolRpcOperation,
}

impl SiteSwapOperation {
    /// Compose the operation from its capabilities.
    #[must_use]
    pub const fn new(
        tenant: TenantContext,
        auth: AuthenticatedOperation,
        rpc: ProtocolRpcOperation,
    ) -> Self {
        Self { tenant, auth, rpc }
    }

    /// Check the options in source, target, archive order.
    ///
    /// # Errors
    ///
    /// Returns [`CsomError::Validation`] for the first missing or invalid URL.
    pub fn validate(&self, options: &SiteSwapOptions) -> CsomResult<SiteSwapRequest> {
        let source_url = self
            .tenant
            .validate_site_url(SiteUrlField::Source, options.source_url.as_deref())?;
        let target_url = self
            .tenant
            .validate_site_url(SiteUrlField::Target, options.target_url.as_deref())?;
        let archive_url = self
            .tenant
            .validate_site_url(SiteUrlField::Archive, options.archive_url.as_deref())?;

        Ok(SiteSwapRequest {
            source_url,
            target_url,
            archive_url,
            disable_redirection: options.disable_redirection,
            wait: options.wait,
        })
    }

    /// Run the swap once.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage. A
    /// [`CsomError::ResponseDecode`] means the swap may have been applied.
    pub async fn run(
        &self,
        options: &SiteSwapOptions,
        control: &OperationControl,
    ) -> CsomResult<SwapReport> {
        let span = info_span!("site_swap", source = field::Empty, target = field::Empty);
        let mut stages = Vec::with_capacity(7);

        let result = self
            .drive(options, control, &mut stages)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match result {
            Ok(trace_correlation_id) => {
                stages.push(SwapStage::Succeeded);
                info!(trace_correlation_id = ?trace_correlation_id, "site swap completed");
                Ok(SwapReport {
                    trace_correlation_id,
                    stages,
                })
            }
            Err(err) => {
                let stage = stages.last().copied().unwrap_or(SwapStage::Validating);
                warn!(%stage, error = %err, "site swap failed");
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        options: &SiteSwapOptions,
        control: &OperationControl,
        stages: &mut Vec<SwapStage>,
    ) -> CsomResult<Option<String>> {
        stages.push(SwapStage::Validating);
        let request = self.validate(options)?;
        let span = tracing::Span::current();
        span.record("source", request.source_url.as_str());
        span.record("target", request.target_url.as_str());

        stages.push(SwapStage::ResolvingAdminUrl);
        let admin_url = self.auth.resolve_admin_url().await?;
        debug!(admin_url = %admin_url, "resolved admin endpoint");

        stages.push(SwapStage::AcquiringDigest);
        let digest = control
            .guard(SwapStage::AcquiringDigest, self.auth.acquire_digest(&admin_url))
            .await?;

        stages.push(SwapStage::Sending);
        let graph = build_site_swap_request(&request)?;
        let raw = control
            .guard(
                SwapStage::Sending,
                self.rpc.invoke(&admin_url, &digest, &graph),
            )
            .await?;

        stages.push(SwapStage::Parsing);
        match parse(&raw)? {
            ProcessQueryOutcome::Succeeded {
                trace_correlation_id,
            } => Ok(trace_correlation_id),
            ProcessQueryOutcome::Failed(failure) => Err(CsomError::Remote(failure)),
        }
    }
}
