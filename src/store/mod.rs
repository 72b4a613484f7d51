//! Storage seam for tenant metadata, per-tenant schemas and per-user attributes.

pub mod memory;
pub mod postgres;

use crate::error::AppError;
use crate::tenant::{NamespaceName, TenantRecord};
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::{MemoryAttributeStore, MemoryTenantStore};
pub use postgres::{ensure_database_exists, ensure_meta_tables, PgAttributeStore, PgTenantStore};

/// Everything one provisioning transaction writes.
#[derive(Clone, Debug)]
pub struct ProvisionPlan {
    pub tenant_id: Uuid,
    pub namespace: NamespaceName,
    /// Real business name; when `None` no metadata row is written.
    pub business_name: Option<String>,
    pub owner_id: Option<String>,
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Whether the schema exists right now. Never cached.
    async fn schema_exists(&self, namespace: &NamespaceName) -> Result<bool, AppError>;

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, AppError>;

    /// Set the tenant's name when the stored one is a placeholder, inserting the row if absent.
    /// Returns the row when it was written, `None` when a real name was already stored.
    async fn backfill_name(
        &self,
        tenant_id: Uuid,
        name: &str,
        owner_id: Option<&str>,
    ) -> Result<Option<TenantRecord>, AppError>;

    /// Create the schema, upsert the metadata row and grant privileges in one transaction.
    /// On error nothing is left behind.
    async fn provision(&self, plan: &ProvisionPlan) -> Result<Option<TenantRecord>, AppError>;

    /// Cheap reachability check for the readiness route.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Durable per-user attribute store mirrored by tenant resolution.
#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn get_attribute(&self, user_id: &str, key: &str) -> Result<Option<String>, AppError>;

    async fn set_attribute(&self, user_id: &str, key: &str, value: &str) -> Result<(), AppError>;
}
