//! Shared application state for all routes. The lock registry lives for the whole process.

use crate::error::ConfigError;
use crate::identity::TokenVerifier;
use crate::lock::OperationLocks;
use crate::resolution::{MokaTenantCache, TenantCache, TenantResolver};
use crate::service::SchemaProvisioner;
use crate::settings::Settings;
use crate::store::{AttributeStore, TenantStore};
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TenantStore>,
    pub provisioner: Arc<SchemaProvisioner>,
    pub resolver: Arc<TenantResolver>,
    pub verifier: TokenVerifier,
}

impl AppState {
    /// Wire the provisioner and resolver over the given stores with a default-sized
    /// tenant cache. Bearer token signatures are not checked; use
    /// [`from_settings`](Self::from_settings) to configure a key.
    pub fn new(
        store: Arc<dyn TenantStore>,
        attributes: Arc<dyn AttributeStore>,
        locks: OperationLocks,
    ) -> Self {
        Self::build(
            store,
            attributes,
            locks,
            Arc::new(MokaTenantCache::default()),
            TokenVerifier::unverified(),
        )
    }

    /// Wire state with the cache bounds and token key from `settings`.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn TenantStore>,
        attributes: Arc<dyn AttributeStore>,
        locks: OperationLocks,
    ) -> Result<Self, ConfigError> {
        let cache = MokaTenantCache::new(settings.tenant_cache_capacity, settings.tenant_cache_ttl);
        Ok(Self::build(
            store,
            attributes,
            locks,
            Arc::new(cache),
            settings.token_verifier()?,
        ))
    }

    fn build(
        store: Arc<dyn TenantStore>,
        attributes: Arc<dyn AttributeStore>,
        locks: OperationLocks,
        cache: Arc<dyn TenantCache>,
        verifier: TokenVerifier,
    ) -> Self {
        let provisioner = Arc::new(SchemaProvisioner::new(Arc::clone(&store), locks));
        let resolver = Arc::new(TenantResolver::new(cache, attributes));
        AppState {
            store,
            provisioner,
            resolver,
            verifier,
        }
    }

    pub fn locks(&self) -> &OperationLocks {
        self.provisioner.locks()
    }
}

impl FromRef<AppState> for TokenVerifier {
    fn from_ref(state: &AppState) -> TokenVerifier {
        state.verifier.clone()
    }
}
