//! Route assembly.

pub mod common;
pub mod tenant;

pub use common::common_routes_with_ready;
pub use tenant::tenant_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies on these routes are small JSON documents.
pub const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Full application router: common routes at the root, tenant routes under `/api`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api", tenant_routes(state))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}
