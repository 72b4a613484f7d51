//! Tenant schema manager: existence check (GET) and provisioning (POST).

use crate::error::AppError;
use crate::extractors::BearerClaims;
use crate::response::{ProvisionBody, SchemaStatusBody};
use crate::service::{resolve_target_tenant, ProvisionRequest};
use crate::state::AppState;
use crate::tenant::parse_tenant_id;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaQuery {
    pub tenant_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionPayload {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub business_name: Option<String>,
    pub force_create: Option<bool>,
}

/// GET /api/tenant/schema-manager?tenantId=<uuid>: does the tenant's schema and row exist.
pub async fn get_schema_status(
    State(state): State<AppState>,
    Query(query): Query<SchemaQuery>,
) -> Result<Json<SchemaStatusBody>, AppError> {
    let tenant_id = query
        .tenant_id
        .as_deref()
        .and_then(parse_tenant_id)
        .ok_or(AppError::InvalidTenantId)?;
    let status = state.provisioner.inspect(tenant_id).await?;
    Ok(Json(status.into()))
}

/// POST /api/tenant/schema-manager: ensure the tenant's schema exists, creating it under forceCreate.
/// Unparseable or mistyped bodies are answered with the same 400 shape as other client errors.
pub async fn post_schema(
    State(state): State<AppState>,
    BearerClaims(caller): BearerClaims,
    payload: Result<Json<ProvisionPayload>, JsonRejection>,
) -> Result<Json<ProvisionBody>, AppError> {
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let force_create = body.force_create.unwrap_or(false);
    let tenant_id = resolve_target_tenant(
        body.tenant_id.as_deref(),
        body.user_id.as_deref(),
        caller.as_ref(),
        force_create,
    )?;
    let owner_id = body
        .user_id
        .or_else(|| caller.as_ref().and_then(|c| c.subject().map(String::from)));
    let outcome = state
        .provisioner
        .provision(ProvisionRequest {
            tenant_id,
            business_name: body.business_name,
            owner_id,
            force_create,
        })
        .await?;
    Ok(Json(outcome.into()))
}
