//! Object-path recipes issued by the CLI.

use tracing::debug;

use crate::error::CsomResult;
use crate::model::{ActionId, GraphBuilder, ObjectPathId, ParameterValue, RequestGraph};

/// Remote type id of the tenant administration object.
pub const TENANT_TYPE_ID: &str = "{268004ae-ef6b-4e9b-8425-127220d84719}";

/// Method invoked on the tenant object to swap two sites.
pub const SWAP_METHOD: &str = "SwapSiteWithSmartGestureOptionForce";

// The service receives these literals whatever the CLI flags say.
const SWAP_FIRST_FLAG: bool = true;
const SWAP_SECOND_FLAG: bool = false;

const TENANT_PATH: ObjectPathId = ObjectPathId::new(3);
const SWAP_PATH: ObjectPathId = ObjectPathId::new(5);
const MATERIALIZE_TENANT: ActionId = ActionId::new(4);
const MATERIALIZE_SWAP: ActionId = ActionId::new(6);
const QUERY_SWAP: ActionId = ActionId::new(7);

/// Validated input for a site swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSwapRequest {
    /// Site moved into the target location.
    pub source_url: String,
    /// Location the source site is swapped into.
    pub target_url: String,
    /// Location the current target site is archived to.
    pub archive_url: String,
    /// Whether the redirect at the source location should be skipped.
    pub disable_redirection: bool,
    /// Whether the caller asked to wait for the swap job.
    pub wait: bool,
}

/// Build the call graph for a site swap.
///
/// # Errors
///
/// Returns [`crate::CsomError::MalformedGraph`] only if the fixed recipe
/// numbering were inconsistent.
pub fn build_site_swap_request(request: &SiteSwapRequest) -> CsomResult<RequestGraph> {
    debug!(
        disable_redirection = request.disable_redirection,
        wait = request.wait,
        "building site swap request graph"
    );

    let parameters = vec![
        ParameterValue::String(request.source_url.clone()),
        ParameterValue::String(request.target_url.clone()),
        ParameterValue::String(request.archive_url.clone()),
        ParameterValue::Boolean(SWAP_FIRST_FLAG),
        ParameterValue::Boolean(SWAP_SECOND_FLAG),
    ];

    let mut builder = GraphBuilder::new();
    builder
        .constructor(TENANT_PATH, TENANT_TYPE_ID)?
        .method(SWAP_PATH, TENANT_PATH, SWAP_METHOD, parameters)?
        .object_path_action(MATERIALIZE_TENANT, TENANT_PATH)?
        .object_path_action(MATERIALIZE_SWAP, SWAP_PATH)?
        .query_action(QUERY_SWAP, SWAP_PATH, true)?;
    Ok(builder.build())
}
