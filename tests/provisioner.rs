use std::sync::Arc;
use std::time::Duration;
use tenant_schema_manager::service::resolve_target_tenant;
use tenant_schema_manager::tenant::{derive_tenant_id, parse_tenant_id};
use tenant_schema_manager::{
    AppError, Claims, MemoryTenantStore, NamespaceName, OperationLocks, ProvisionRequest,
    SchemaProvisioner, TENANT_ID_NAMESPACE,
};
use uuid::Uuid;

const TENANT: &str = "9a551c44-4ade-4f89-b078-0af8be794c23";

fn tenant() -> Uuid {
    parse_tenant_id(TENANT).unwrap()
}

fn setup() -> (Arc<MemoryTenantStore>, SchemaProvisioner) {
    let store = Arc::new(MemoryTenantStore::new());
    let provisioner = SchemaProvisioner::new(store.clone(), OperationLocks::default());
    (store, provisioner)
}

fn create(name: Option<&str>) -> ProvisionRequest {
    ProvisionRequest {
        tenant_id: tenant(),
        business_name: name.map(String::from),
        owner_id: Some("auth0|owner".into()),
        force_create: true,
    }
}

#[tokio::test]
async fn fresh_tenant_reports_nothing() {
    let (_store, provisioner) = setup();
    let status = provisioner.inspect(tenant()).await.unwrap();
    assert!(!status.schema_exists);
    assert!(status.tenant.is_none());
    assert_eq!(status.namespace, NamespaceName::for_tenant(&tenant()));
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let (store, provisioner) = setup();

    let first = provisioner.provision(create(Some("Acme"))).await.unwrap();
    assert!(first.created);
    assert!(!first.existed);
    let row = first.tenant.unwrap();
    assert_eq!(row.name, "Acme");
    assert!(row.rls_enabled);
    assert_eq!(row.owner_id.as_deref(), Some("auth0|owner"));

    let second = provisioner.provision(create(Some("Acme"))).await.unwrap();
    assert!(!second.created);
    assert!(second.existed);
    assert_eq!(second.tenant.map(|t| t.name), Some("Acme".to_string()));

    assert_eq!(store.provision_calls(), 1);
    assert_eq!(store.schema_count(), 1);
    assert!(!provisioner.locks().is_locked(first.namespace.as_str()));
}

#[tokio::test]
async fn placeholder_name_creates_schema_only_then_backfills() {
    let (_store, provisioner) = setup();

    let created = provisioner.provision(create(Some("Default Business"))).await.unwrap();
    assert!(created.created);
    assert!(created.tenant.is_none());

    let again = provisioner.provision(create(Some("Globex"))).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.tenant.as_ref().map(|t| t.name.as_str()), Some("Globex"));

    // a real name is never replaced
    let third = provisioner.provision(create(Some("Initech"))).await.unwrap();
    assert_eq!(third.tenant.map(|t| t.name), Some("Globex".to_string()));
}

#[tokio::test]
async fn missing_schema_without_force_create_is_rejected() {
    let (store, provisioner) = setup();
    let err = provisioner
        .provision(ProvisionRequest {
            force_create: false,
            ..create(Some("Acme"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(store.provision_calls(), 0);
    assert!(!provisioner.locks().is_locked(NamespaceName::for_tenant(&tenant()).as_str()));
}

#[tokio::test]
async fn held_lock_yields_conflict_without_store_access() {
    let (store, provisioner) = setup();
    let ns = NamespaceName::for_tenant(&tenant());
    let guard = provisioner.locks().try_acquire(ns.as_str(), "test").unwrap();

    match provisioner.provision(create(Some("Acme"))).await {
        Err(AppError::Locked { tenant_id, schema_name }) => {
            assert_eq!(tenant_id, tenant());
            assert_eq!(schema_name, ns.as_str());
        }
        other => panic!("expected conflict, got {:?}", other.map(|o| o.created)),
    }
    assert_eq!(store.provision_calls(), 0);

    drop(guard);
    assert!(provisioner.provision(create(Some("Acme"))).await.unwrap().created);
}

#[tokio::test]
async fn concurrent_provisioning_is_mutually_exclusive() {
    let (store, provisioner) = setup();
    store.set_latency(Some(Duration::from_millis(200)));
    let provisioner = Arc::new(provisioner);

    let first = {
        let p = Arc::clone(&provisioner);
        tokio::spawn(async move { p.provision(create(Some("Acme"))).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = provisioner.provision(create(Some("Acme"))).await;
    assert!(matches!(second, Err(AppError::Locked { .. })));

    let first = first.await.unwrap().unwrap();
    assert!(first.created);

    store.set_latency(None);
    let third = provisioner.provision(create(Some("Acme"))).await.unwrap();
    assert!(!third.created);
    assert!(third.existed);
    assert_eq!(store.provision_calls(), 1);
}

#[tokio::test]
async fn failed_upsert_rolls_back_schema_and_releases_lock() {
    let (store, provisioner) = setup();
    store.fail_tenant_upsert(true);

    let err = provisioner.provision(create(Some("Acme"))).await.unwrap_err();
    assert!(matches!(err, AppError::Store(_)));

    let status = provisioner.inspect(tenant()).await.unwrap();
    assert!(!status.schema_exists);
    assert!(status.tenant.is_none());
    assert!(!provisioner.locks().is_locked(status.namespace.as_str()));

    store.fail_tenant_upsert(false);
    assert!(provisioner.provision(create(Some("Acme"))).await.unwrap().created);
}

#[tokio::test]
async fn unreachable_store_surfaces_error() {
    let (store, provisioner) = setup();
    store.set_unreachable(true);
    assert!(matches!(provisioner.inspect(tenant()).await, Err(AppError::Store(_))));
    assert!(matches!(provisioner.provision(create(None)).await, Err(AppError::Store(_))));
    assert!(!provisioner.locks().is_locked(NamespaceName::for_tenant(&tenant()).as_str()));
}

#[test]
fn target_tenant_precedence() {
    assert_eq!(resolve_target_tenant(Some(TENANT), Some("u1"), None, false).unwrap(), tenant());

    let from_user = resolve_target_tenant(Some("bad"), Some("u1"), None, false).unwrap();
    assert_eq!(from_user, derive_tenant_id(&TENANT_ID_NAMESPACE, "u1"));

    let claims = Claims::new(
        serde_json::json!({ "sub": "auth0|9", "tenant_id": TENANT })
            .as_object()
            .cloned()
            .unwrap(),
    );
    assert_eq!(resolve_target_tenant(None, None, Some(&claims), false).unwrap(), tenant());

    let sub_only = Claims::new(serde_json::json!({ "sub": "auth0|9" }).as_object().cloned().unwrap());
    assert_eq!(
        resolve_target_tenant(None, None, Some(&sub_only), false).unwrap(),
        derive_tenant_id(&TENANT_ID_NAMESPACE, "auth0|9")
    );

    assert!(matches!(
        resolve_target_tenant(None, None, None, false),
        Err(AppError::BadRequest(_))
    ));
    let minted = resolve_target_tenant(None, None, None, true).unwrap();
    assert_eq!(minted.get_version_num(), 4);
    let blank = resolve_target_tenant(Some("  "), None, None, true).unwrap();
    assert_eq!(blank.get_version_num(), 4);
}

#[test]
fn unrepairable_tenant_id_is_rejected() {
    for force in [false, true] {
        assert!(matches!(
            resolve_target_tenant(Some("typo-123"), None, None, force),
            Err(AppError::BadRequest(m)) if m == "Invalid or missing tenant ID"
        ));
    }
    let claims = Claims::new(serde_json::json!({ "sub": "auth0|9", "tenant_id": TENANT }).as_object().cloned().unwrap());
    assert!(resolve_target_tenant(Some("typo-123"), Some(" "), Some(&claims), true).is_err());
}
