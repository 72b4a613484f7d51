//! Tenant schema manager: per-tenant PostgreSQL schema provisioning behind a
//! process-local operation lock, plus tenant id resolution across storage tiers.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod lock;
pub mod resolution;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod state;
pub mod store;
pub mod tenant;

pub use error::{AppError, ConfigError};
pub use identity::{Claims, TokenVerifier};
pub use lock::{spawn_lock_sweeper, LockGuard, OperationLocks};
pub use resolution::{MokaTenantCache, Resolution, ResolutionInput, SourceKind, TenantCache, TenantResolver};
pub use routes::{app, common_routes_with_ready, tenant_routes};
pub use service::{SchemaProvisioner, ProvisionRequest, ProvisionOutcome};
pub use settings::Settings;
pub use state::AppState;
pub use store::{
    ensure_database_exists, ensure_meta_tables, MemoryAttributeStore, MemoryTenantStore,
    PgAttributeStore, PgTenantStore, TenantStore,
};
pub use tenant::{NamespaceName, TenantRecord, TENANT_ID_NAMESPACE};
