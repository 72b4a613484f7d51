//! Tenant schema manager server.
//!
//! Run from repo root: `cargo run -p tenant-schema-server`

use std::sync::Arc;
use tenant_schema_manager::{
    app,
    ensure_database_exists,
    ensure_meta_tables,
    spawn_lock_sweeper,
    AppState,
    OperationLocks,
    PgAttributeStore,
    PgTenantStore,
    Settings,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("tenant_schema_manager=info,tenant_schema_server=info")
            }),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    ensure_meta_tables(&pool, &settings.meta_schema).await?;

    let locks = OperationLocks::new(settings.lock_timeout);
    let sweeper = spawn_lock_sweeper(locks.clone(), settings.lock_sweep_interval);
    let state = AppState::from_settings(
        &settings,
        Arc::new(PgTenantStore::new(
            pool.clone(),
            settings.meta_schema.clone(),
            settings.admin_role.clone(),
        )),
        Arc::new(PgAttributeStore::new(pool.clone(), settings.meta_schema.clone())),
        locks,
    )?;

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("tenant schema manager listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
