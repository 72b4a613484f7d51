//! In-memory stores for local runs and tests. Provisioning stages every write and
//! applies them together, so an injected fault leaves nothing behind.

use crate::error::AppError;
use crate::store::{AttributeStore, ProvisionPlan, TenantStore};
use crate::tenant::{is_placeholder_name, NamespaceName, TenantRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Default)]
struct Tables {
    schemas: HashSet<String>,
    tenants: HashMap<Uuid, TenantRecord>,
}

#[derive(Default)]
pub struct MemoryTenantStore {
    tables: Mutex<Tables>,
    latency: Mutex<Option<Duration>>,
    unreachable: AtomicBool,
    fail_tenant_upsert: AtomicBool,
    provision_calls: AtomicUsize,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delay every provisioning transaction, keeping it in flight.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    /// Make every call fail as if the database were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fail the metadata upsert step after the schema was created inside the transaction.
    pub fn fail_tenant_upsert(&self, fail: bool) {
        self.fail_tenant_upsert.store(fail, Ordering::SeqCst);
    }

    /// Number of provisioning transactions started.
    pub fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    /// Insert a tenant row directly.
    pub fn seed_tenant(&self, record: TenantRecord) {
        self.tables().tenants.insert(record.id, record);
    }

    pub fn schema_count(&self) -> usize {
        self.tables().schemas.len()
    }

    fn check_reachable(&self) -> Result<(), AppError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::Store("connection refused".into()));
        }
        Ok(())
    }
}

fn new_record(tenant_id: Uuid, name: &str, owner_id: Option<&str>) -> TenantRecord {
    let now = Utc::now();
    TenantRecord {
        id: tenant_id,
        name: name.to_string(),
        owner_id: owner_id.map(String::from),
        rls_enabled: true,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn schema_exists(&self, namespace: &NamespaceName) -> Result<bool, AppError> {
        self.check_reachable()?;
        Ok(self.tables().schemas.contains(namespace.as_str()))
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, AppError> {
        self.check_reachable()?;
        Ok(self.tables().tenants.get(&tenant_id).cloned())
    }

    async fn backfill_name(
        &self,
        tenant_id: Uuid,
        name: &str,
        owner_id: Option<&str>,
    ) -> Result<Option<TenantRecord>, AppError> {
        self.check_reachable()?;
        let mut tables = self.tables();
        match tables.tenants.get_mut(&tenant_id) {
            Some(existing) if is_placeholder_name(&existing.name) => {
                existing.name = name.to_string();
                existing.updated_at = Utc::now();
                Ok(Some(existing.clone()))
            }
            Some(_) => Ok(None),
            None => {
                let record = new_record(tenant_id, name, owner_id);
                tables.tenants.insert(tenant_id, record.clone());
                Ok(Some(record))
            }
        }
    }

    async fn provision(&self, plan: &ProvisionPlan) -> Result<Option<TenantRecord>, AppError> {
        self.check_reachable()?;
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut tables = self.tables();
        let mut staged = tables.clone();
        staged.schemas.insert(plan.namespace.as_str().to_string());

        let record = match plan.business_name.as_deref() {
            Some(name) => {
                if self.fail_tenant_upsert.load(Ordering::SeqCst) {
                    tracing::error!("rolling back provisioning of {}", plan.namespace);
                    return Err(AppError::Store(format!(
                        "insert into tenant failed for {}",
                        plan.tenant_id
                    )));
                }
                let record = match staged.tenants.get(&plan.tenant_id) {
                    Some(existing) => TenantRecord {
                        name: name.to_string(),
                        rls_enabled: true,
                        updated_at: Utc::now(),
                        ..existing.clone()
                    },
                    None => new_record(plan.tenant_id, name, plan.owner_id.as_deref()),
                };
                staged.tenants.insert(plan.tenant_id, record.clone());
                Some(record)
            }
            None => None,
        };

        *tables = staged;
        Ok(record)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check_reachable()
    }
}

/// Attribute store kept in a map; can be switched to failing.
#[derive(Default)]
pub struct MemoryAttributeStore {
    values: Mutex<HashMap<(String, String), String>>,
    failing: AtomicBool,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn values(&self) -> MutexGuard<'_, HashMap<(String, String), String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AttributeStore for MemoryAttributeStore {
    async fn get_attribute(&self, user_id: &str, key: &str) -> Result<Option<String>, AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Store("attribute store unavailable".into()));
        }
        Ok(self.values().get(&(user_id.to_string(), key.to_string())).cloned())
    }

    async fn set_attribute(&self, user_id: &str, key: &str, value: &str) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Store("attribute store unavailable".into()));
        }
        self.values()
            .insert((user_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}
