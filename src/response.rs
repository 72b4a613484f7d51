//! Response bodies of the tenant endpoints.

use crate::service::{ProvisionOutcome, SchemaStatus};
use crate::tenant::TenantRecord;
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaStatusBody {
    pub success: bool,
    pub schema_exists: bool,
    pub tenant_exists: bool,
    pub tenant_info: Option<TenantRecord>,
    pub schema_name: String,
    pub tenant_id: Uuid,
}

impl From<SchemaStatus> for SchemaStatusBody {
    fn from(status: SchemaStatus) -> Self {
        SchemaStatusBody {
            success: true,
            schema_exists: status.schema_exists,
            tenant_exists: status.tenant.is_some(),
            tenant_info: status.tenant,
            schema_name: status.namespace.to_string(),
            tenant_id: status.tenant_id,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionBody {
    pub success: bool,
    pub message: String,
    pub schema_name: String,
    pub tenant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_info: Option<TenantRecord>,
    pub exists: bool,
    pub created: bool,
}

impl From<ProvisionOutcome> for ProvisionBody {
    fn from(outcome: ProvisionOutcome) -> Self {
        ProvisionBody {
            success: true,
            message: outcome.message,
            schema_name: outcome.namespace.to_string(),
            tenant_id: outcome.tenant_id,
            tenant_info: outcome.tenant,
            exists: outcome.existed,
            created: outcome.created,
        }
    }
}
