//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Message returned when a tenant id is absent or not a UUID.
pub const INVALID_TENANT_ID: &str = "Invalid or missing tenant ID";

/// Message returned when another provisioning operation holds the namespace lock.
pub const LOCKED_MESSAGE: &str = "Schema creation already in progress";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}", INVALID_TENANT_ID)]
    InvalidTenantId,
    #[error("{0}")]
    BadRequest(String),
    #[error("{}", LOCKED_MESSAGE)]
    Locked { tenant_id: Uuid, schema_name: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("store: {0}")]
    Store(String),
}

/// 400 body for requests that carry an unusable tenant id.
#[derive(Serialize)]
pub struct ErrorOnly {
    pub error: &'static str,
}

/// 400 body for rejected provisioning requests.
#[derive(Serialize)]
pub struct Rejection {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedBody {
    pub success: bool,
    pub message: &'static str,
    pub tenant_id: Uuid,
    pub schema_name: String,
}

/// 500 body: generic `error` plus the underlying message for diagnostics.
#[derive(Serialize)]
pub struct ServerErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InvalidTenantId => (
                StatusCode::BAD_REQUEST,
                Json(ErrorOnly {
                    error: INVALID_TENANT_ID,
                }),
            )
                .into_response(),
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(Rejection {
                    success: false,
                    message,
                }),
            )
                .into_response(),
            AppError::Locked {
                tenant_id,
                schema_name,
            } => (
                StatusCode::CONFLICT,
                Json(LockedBody {
                    success: false,
                    message: LOCKED_MESSAGE,
                    tenant_id,
                    schema_name,
                }),
            )
                .into_response(),
            AppError::Db(e) => server_error("Database error", e.to_string()),
            AppError::Store(message) => server_error("Store error", message),
            AppError::Config(e) => server_error("Configuration error", e.to_string()),
        }
    }
}

fn server_error(error: &'static str, message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ServerErrorBody { error, message }),
    )
        .into_response()
}
