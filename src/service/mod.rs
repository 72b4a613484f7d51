//! Tenant schema services.

pub mod provisioner;

pub use provisioner::{
    resolve_target_tenant, ProvisionOutcome, ProvisionRequest, SchemaProvisioner, SchemaStatus,
};
