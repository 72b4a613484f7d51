//! Schema existence checks and idempotent per-tenant schema provisioning.

use crate::error::{AppError, INVALID_TENANT_ID};
use crate::identity::Claims;
use crate::lock::OperationLocks;
use crate::store::{ProvisionPlan, TenantStore};
use crate::tenant::{
    derive_tenant_id, real_business_name, repair_tenant_id, NamespaceName, TenantRecord,
    TENANT_ID_NAMESPACE,
};
use std::sync::Arc;
use uuid::Uuid;

const CREATE_OPERATION: &str = "create_schema";

/// What the store currently holds for a tenant.
#[derive(Clone, Debug)]
pub struct SchemaStatus {
    pub tenant_id: Uuid,
    pub namespace: NamespaceName,
    pub schema_exists: bool,
    pub tenant: Option<TenantRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct ProvisionRequest {
    pub tenant_id: Uuid,
    pub business_name: Option<String>,
    pub owner_id: Option<String>,
    pub force_create: bool,
}

#[derive(Clone, Debug)]
pub struct ProvisionOutcome {
    pub tenant_id: Uuid,
    pub namespace: NamespaceName,
    pub message: String,
    pub tenant: Option<TenantRecord>,
    /// Whether the schema existed before this call.
    pub existed: bool,
    pub created: bool,
}

/// Pick the tenant id a provisioning request operates on.
///
/// Order: a valid `tenant_id`, then an id derived from `user_id`, then the
/// caller's tenant claim, then an id derived from the caller's subject. A fresh
/// random id is only minted when no `tenant_id` was supplied and `force_create`
/// is set. A supplied `tenant_id` that is not a UUID and cannot be repaired from
/// `user_id` is rejected.
pub fn resolve_target_tenant(
    tenant_id: Option<&str>,
    user_id: Option<&str>,
    caller: Option<&Claims>,
    force_create: bool,
) -> Result<Uuid, AppError> {
    if let Some(id) = repair_tenant_id(tenant_id, user_id) {
        return Ok(id);
    }
    if let Some(raw) = tenant_id.map(str::trim).filter(|t| !t.is_empty()) {
        tracing::warn!("rejecting unrepairable tenant id {:?}", raw);
        return Err(AppError::BadRequest(INVALID_TENANT_ID.into()));
    }
    if let Some(claims) = caller {
        if let Some(id) = claims.tenant_id() {
            return Ok(id);
        }
        if let Some(sub) = claims.subject() {
            return Ok(derive_tenant_id(&TENANT_ID_NAMESPACE, sub));
        }
    }
    if force_create {
        let id = Uuid::new_v4();
        tracing::info!("no tenant id supplied, minted {} under forceCreate", id);
        return Ok(id);
    }
    Err(AppError::BadRequest(
        "No tenant ID provided and forceCreate not set".into(),
    ))
}

pub struct SchemaProvisioner {
    store: Arc<dyn TenantStore>,
    locks: OperationLocks,
}

impl SchemaProvisioner {
    pub fn new(store: Arc<dyn TenantStore>, locks: OperationLocks) -> Self {
        SchemaProvisioner { store, locks }
    }

    pub fn locks(&self) -> &OperationLocks {
        &self.locks
    }

    /// Read-only existence check for the tenant's schema and metadata row.
    pub async fn inspect(&self, tenant_id: Uuid) -> Result<SchemaStatus, AppError> {
        let namespace = NamespaceName::for_tenant(&tenant_id);
        let schema_exists = self.store.schema_exists(&namespace).await?;
        let tenant = self.store.find_tenant(tenant_id).await?;
        Ok(SchemaStatus {
            tenant_id,
            namespace,
            schema_exists,
            tenant,
        })
    }

    /// Ensure the tenant's schema (and, given a real name, its metadata row) exists.
    ///
    /// Returns [`AppError::Locked`] without touching the store while another
    /// operation on the same schema is in flight. Creating anything requires
    /// `force_create`.
    pub async fn provision(&self, req: ProvisionRequest) -> Result<ProvisionOutcome, AppError> {
        let namespace = NamespaceName::for_tenant(&req.tenant_id);
        let Some(_guard) = self.locks.try_acquire(namespace.as_str(), CREATE_OPERATION) else {
            tracing::warn!("schema operation already in progress for {}", namespace);
            return Err(AppError::Locked {
                tenant_id: req.tenant_id,
                schema_name: namespace.to_string(),
            });
        };

        let business_name = real_business_name(req.business_name.as_deref());

        if self.store.schema_exists(&namespace).await? {
            let mut tenant = self.store.find_tenant(req.tenant_id).await?;
            let needs_name = tenant
                .as_ref()
                .map(|t| real_business_name(Some(&t.name)).is_none())
                .unwrap_or(true);
            if let (Some(name), true) = (business_name.as_deref(), needs_name) {
                if let Some(updated) = self
                    .store
                    .backfill_name(req.tenant_id, name, req.owner_id.as_deref())
                    .await?
                {
                    tracing::info!("backfilled name of tenant {} to {:?}", req.tenant_id, name);
                    tenant = Some(updated);
                }
            }
            return Ok(ProvisionOutcome {
                tenant_id: req.tenant_id,
                namespace,
                message: "Schema already exists".into(),
                tenant,
                existed: true,
                created: false,
            });
        }

        if !req.force_create {
            return Err(AppError::BadRequest(
                "Schema does not exist and forceCreate not set".into(),
            ));
        }

        let plan = ProvisionPlan {
            tenant_id: req.tenant_id,
            namespace: namespace.clone(),
            business_name,
            owner_id: req.owner_id,
        };
        let tenant = match self.store.provision(&plan).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("provisioning {} failed and was rolled back: {}", namespace, e);
                return Err(e);
            }
        };
        tracing::info!("created schema {} for tenant {}", namespace, req.tenant_id);

        Ok(ProvisionOutcome {
            tenant_id: req.tenant_id,
            namespace,
            message: "Schema created".into(),
            tenant,
            existed: false,
            created: true,
        })
    }
}
