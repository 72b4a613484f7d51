//! Tenant routes: schema manager and resolution.

use crate::handlers::{get_schema_status, post_schema, resolve_tenant};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn tenant_routes(state: AppState) -> Router {
    Router::new()
        .route("/tenant/schema-manager", get(get_schema_status).post(post_schema))
        .route("/tenant/resolve", get(resolve_tenant))
        .with_state(state)
}
