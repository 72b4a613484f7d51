//! Tenant resolution for the calling user.

use crate::extractors::BearerClaims;
use crate::resolution::{Resolution, ResolutionInput};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ResolveQuery {
    /// Client URL path, scanned for a tenant id as the last resort.
    pub path: Option<String>,
}

/// GET /api/tenant/resolve?path=...: resolve and repair the caller's tenant id.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    BearerClaims(caller): BearerClaims,
    Query(query): Query<ResolveQuery>,
) -> Json<Resolution> {
    let resolution = state
        .resolver
        .resolve(ResolutionInput {
            user_key: caller.as_ref().and_then(|c| c.subject()),
            claims: caller.as_ref(),
            path: query.path.as_deref(),
        })
        .await;
    Json(resolution)
}
