#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Client for the tenant administration object-path protocol.
//!
//! Layout:
//! - `model.rs`: call graph nodes, actions, and the invariant-checking builder
//! - `recipe.rs`: fixed call graphs issued by commands (site swap)
//! - `serialize.rs`: exact XML rendering of a call graph
//! - `response.rs`: positional decoding of `ProcessQuery` responses
//! - `transport.rs`: digest acquisition and `ProcessQuery` posts over HTTP
//! - `tenant.rs`: site URL validation and admin endpoint resolution
//! - `operation.rs`: the site swap state machine

pub mod error;
pub mod model;
pub mod operation;
pub mod recipe;
pub mod response;
pub mod serialize;
pub mod tenant;
pub mod transport;

pub use error::{CsomError, CsomResult};
pub use model::{
    ActionId, ActionNode, GraphBuilder, ObjectPathId, ObjectPathNode, ParameterValue, RequestGraph,
};
pub use operation::{
    AuthenticatedOperation, CancelHandle, CancelSignal, OperationControl, ProtocolRpcOperation,
    SiteSwapOperation, SiteSwapOptions, SwapReport, SwapStage,
};
pub use recipe::{SiteSwapRequest, build_site_swap_request};
pub use response::{ProcessQueryOutcome, RemoteFailure, parse};
pub use serialize::serialize;
pub use tenant::{AdminUrlResolver, SiteUrlField, TenantContext};
pub use transport::{DigestProvider, DigestToken, HttpTransport, ProtocolClient};
