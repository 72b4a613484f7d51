//! Tenant resolution across storage tiers of differing trust.
//!
//! Sources are consulted in descending trust: the identity token's tenant claim,
//! the fast cache, then a UUID-shaped URL path segment. The first source that
//! yields a value wins. When the winner differs from the cached value the cache
//! is overwritten and the durable attribute store is updated in the background.
//! Cache and attribute store are mirrors; the token claim is authoritative
//! whenever present. A cache miss is filled from the attribute store before the
//! chain runs, so a restarted process picks up earlier resolutions. Nothing here
//! returns an error: failures are logged and the chain moves on to the next source.

use crate::error::AppError;
use crate::identity::Claims;
use crate::store::AttributeStore;
use crate::tenant::{parse_tenant_id, tenant_id_in_path};
use async_trait::async_trait;
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Attribute key under which the tenant id is mirrored per user.
pub const TENANT_ATTRIBUTE: &str = "tenant_id";

pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TokenClaim,
    Cache,
    UrlPath,
}

/// Fast per-user cache of the resolved tenant id.
#[async_trait]
pub trait TenantCache: Send + Sync {
    async fn get(&self, user_key: &str) -> Result<Option<Uuid>, AppError>;
    async fn set(&self, user_key: &str, tenant_id: Uuid) -> Result<(), AppError>;
}

/// In-process cache bounded by entry count, with entries expiring after a fixed lifetime.
#[derive(Clone)]
pub struct MokaTenantCache {
    entries: Cache<String, Uuid>,
}

impl MokaTenantCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        MokaTenantCache {
            entries: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }

    /// Approximate number of entries; pending evictions may not be reflected yet.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl Default for MokaTenantCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }
}

#[async_trait]
impl TenantCache for MokaTenantCache {
    async fn get(&self, user_key: &str) -> Result<Option<Uuid>, AppError> {
        Ok(self.entries.get(user_key).await)
    }

    async fn set(&self, user_key: &str, tenant_id: Uuid) -> Result<(), AppError> {
        self.entries.insert(user_key.to_string(), tenant_id).await;
        Ok(())
    }
}

/// Inputs available for one resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolutionInput<'a> {
    /// Key for the cache and the attribute store, normally the token subject.
    pub user_key: Option<&'a str>,
    pub claims: Option<&'a Claims>,
    pub path: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub tenant_id: Option<Uuid>,
    pub source: Option<SourceKind>,
    /// Whether the cache (and in the background, the attribute store) was rewritten.
    pub repaired: bool,
}

pub struct TenantResolver {
    cache: Arc<dyn TenantCache>,
    attributes: Arc<dyn AttributeStore>,
}

impl TenantResolver {
    pub fn new(cache: Arc<dyn TenantCache>, attributes: Arc<dyn AttributeStore>) -> Self {
        TenantResolver { cache, attributes }
    }

    /// Cached tenant id for a user. On a miss the attribute store is read and a
    /// valid value is put back into the cache. Failures of either tier read as empty.
    pub async fn cached(&self, user_key: &str) -> Option<Uuid> {
        match self.cache.get(user_key).await {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(e) => tracing::warn!("tenant cache read failed for {}: {}", user_key, e),
        }
        let stored = match self.attributes.get_attribute(user_key, TENANT_ATTRIBUTE).await {
            Ok(value) => value.as_deref().and_then(parse_tenant_id)?,
            Err(e) => {
                tracing::warn!("tenant attribute read failed for {}: {}", user_key, e);
                return None;
            }
        };
        if let Err(e) = self.cache.set(user_key, stored).await {
            tracing::warn!("tenant cache warm-up failed for {}: {}", user_key, e);
        }
        tracing::debug!("warmed tenant cache for {} from attribute store", user_key);
        Some(stored)
    }

    pub async fn resolve(&self, input: ResolutionInput<'_>) -> Resolution {
        let cached = match input.user_key {
            Some(key) => self.cached(key).await,
            None => None,
        };

        let chain = [
            (SourceKind::TokenClaim, input.claims.and_then(Claims::tenant_id)),
            (SourceKind::Cache, cached),
            (SourceKind::UrlPath, input.path.and_then(tenant_id_in_path)),
        ];
        let Some((source, tenant_id)) = chain
            .into_iter()
            .find_map(|(kind, value)| value.map(|id| (kind, id)))
        else {
            tracing::warn!("no tenant id from token, cache or url path");
            return Resolution {
                tenant_id: None,
                source: None,
                repaired: false,
            };
        };

        let repaired = match input.user_key {
            Some(key) if cached != Some(tenant_id) => {
                if let Some(stale) = cached {
                    tracing::info!(
                        "tenant id for {} changed from {} to {} ({:?})",
                        key,
                        stale,
                        tenant_id,
                        source
                    );
                }
                self.repair(key, tenant_id).await;
                true
            }
            _ => false,
        };

        Resolution {
            tenant_id: Some(tenant_id),
            source: Some(source),
            repaired,
        }
    }

    /// Overwrite the cache, then mirror to the attribute store without waiting.
    async fn repair(&self, user_key: &str, tenant_id: Uuid) {
        if let Err(e) = self.cache.set(user_key, tenant_id).await {
            tracing::warn!("tenant cache write failed for {}: {}", user_key, e);
        }
        let attributes = Arc::clone(&self.attributes);
        let user_key = user_key.to_string();
        tokio::spawn(async move {
            let value = tenant_id.to_string();
            if let Err(e) = attributes.set_attribute(&user_key, TENANT_ATTRIBUTE, &value).await {
                tracing::warn!("tenant attribute write failed for {}: {}", user_key, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAttributeStore;
    use serde_json::json;

    const A: &str = "9a551c44-4ade-4f89-b078-0af8be794c23";
    const B: &str = "1f6e7c0a-2b3d-4e5f-8a9b-0c1d2e3f4a5b";

    struct FailingCache;

    #[async_trait]
    impl TenantCache for FailingCache {
        async fn get(&self, _: &str) -> Result<Option<Uuid>, AppError> {
            Err(AppError::Store("cache down".into()))
        }
        async fn set(&self, _: &str, _: Uuid) -> Result<(), AppError> {
            Err(AppError::Store("cache down".into()))
        }
    }

    fn claims_for(tenant: &str) -> Claims {
        Claims::new(json!({ "sub": "auth0|1", "tenant_id": tenant }).as_object().cloned().unwrap())
    }

    async fn attribute_eventually(store: &MemoryAttributeStore, user: &str) -> Option<String> {
        for _ in 0..50 {
            if let Ok(Some(v)) = store.get_attribute(user, TENANT_ATTRIBUTE).await {
                return Some(v);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        None
    }

    #[tokio::test]
    async fn token_claim_overrides_stale_cache() {
        let cache = Arc::new(MokaTenantCache::default());
        let attrs = Arc::new(MemoryAttributeStore::new());
        let a = parse_tenant_id(A).unwrap();
        let b = parse_tenant_id(B).unwrap();
        cache.set("auth0|1", b).await.unwrap();

        let resolver = TenantResolver::new(cache.clone(), attrs.clone());
        let claims = claims_for(A);
        let out = resolver
            .resolve(ResolutionInput {
                user_key: Some("auth0|1"),
                claims: Some(&claims),
                path: Some(&format!("/{}/invoices", B)),
            })
            .await;

        assert_eq!(out.tenant_id, Some(a));
        assert_eq!(out.source, Some(SourceKind::TokenClaim));
        assert!(out.repaired);
        assert_eq!(cache.get("auth0|1").await.unwrap(), Some(a));
        assert_eq!(attribute_eventually(&attrs, "auth0|1").await, Some(A.to_string()));
    }

    #[tokio::test]
    async fn cache_used_without_token_and_left_alone() {
        let cache = Arc::new(MokaTenantCache::default());
        let b = parse_tenant_id(B).unwrap();
        cache.set("u", b).await.unwrap();
        let resolver = TenantResolver::new(cache, Arc::new(MemoryAttributeStore::new()));

        let out = resolver
            .resolve(ResolutionInput {
                user_key: Some("u"),
                ..Default::default()
            })
            .await;
        assert_eq!(out.tenant_id, Some(b));
        assert_eq!(out.source, Some(SourceKind::Cache));
        assert!(!out.repaired);
    }

    #[tokio::test]
    async fn url_path_fallback_is_persisted() {
        let cache = Arc::new(MokaTenantCache::default());
        let attrs = Arc::new(MemoryAttributeStore::new());
        let resolver = TenantResolver::new(cache.clone(), attrs.clone());

        let out = resolver
            .resolve(ResolutionInput {
                user_key: Some("u"),
                claims: None,
                path: Some(&format!("/{}/dashboard", A)),
            })
            .await;
        assert_eq!(out.source, Some(SourceKind::UrlPath));
        assert_eq!(cache.get("u").await.unwrap(), parse_tenant_id(A));
        assert_eq!(attribute_eventually(&attrs, "u").await, Some(A.to_string()));
    }

    #[tokio::test]
    async fn failing_tiers_degrade_to_next_source() {
        let attrs = Arc::new(MemoryAttributeStore::new());
        attrs.set_failing(true);
        let resolver = TenantResolver::new(Arc::new(FailingCache), attrs);

        let out = resolver
            .resolve(ResolutionInput {
                user_key: Some("u"),
                claims: None,
                path: Some(&format!("/app/{}", A)),
            })
            .await;
        assert_eq!(out.tenant_id, parse_tenant_id(A));
        assert_eq!(out.source, Some(SourceKind::UrlPath));
    }

    #[tokio::test]
    async fn nothing_resolves_to_unset() {
        let resolver = TenantResolver::new(Arc::new(MokaTenantCache::default()), Arc::new(MemoryAttributeStore::new()));
        let out = resolver
            .resolve(ResolutionInput {
                user_key: Some("u"),
                claims: None,
                path: Some("/dashboard"),
            })
            .await;
        assert_eq!(
            out,
            Resolution {
                tenant_id: None,
                source: None,
                repaired: false
            }
        );
    }

    #[tokio::test]
    async fn cache_miss_warms_from_attribute_store() {
        let cache = Arc::new(MokaTenantCache::default());
        let attrs = Arc::new(MemoryAttributeStore::new());
        attrs.set_attribute("u", TENANT_ATTRIBUTE, A).await.unwrap();
        let resolver = TenantResolver::new(cache.clone(), attrs);

        let out = resolver
            .resolve(ResolutionInput {
                user_key: Some("u"),
                ..Default::default()
            })
            .await;
        assert_eq!(out.tenant_id, parse_tenant_id(A));
        assert_eq!(out.source, Some(SourceKind::Cache));
        assert!(!out.repaired);
        assert_eq!(cache.get("u").await.unwrap(), parse_tenant_id(A));
    }

    #[tokio::test]
    async fn garbage_in_attribute_store_is_ignored() {
        let attrs = Arc::new(MemoryAttributeStore::new());
        attrs.set_attribute("u", TENANT_ATTRIBUTE, "not-a-uuid").await.unwrap();
        let resolver = TenantResolver::new(Arc::new(MokaTenantCache::default()), attrs);
        assert_eq!(resolver.cached("u").await, None);
    }

    #[tokio::test]
    async fn cache_is_bounded() {
        let cache = MokaTenantCache::new(16, DEFAULT_CACHE_TTL);
        let id = parse_tenant_id(A).unwrap();
        for i in 0..2_000 {
            cache.set(&format!("user-{}", i), id).await.unwrap();
        }
        cache.entries.run_pending_tasks().await;
        assert!(cache.entry_count() <= 16, "cache holds {} entries", cache.entry_count());
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = MokaTenantCache::new(16, Duration::from_millis(50));
        cache.set("u", parse_tenant_id(A).unwrap()).await.unwrap();
        assert!(cache.get("u").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("u").await.unwrap(), None);
    }
}
