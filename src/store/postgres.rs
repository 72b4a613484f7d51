//! PostgreSQL store: metadata table DDL, schema provisioning transaction, user attributes.
//! Metadata tables live in the schema named by `TENANT_META_SCHEMA` (default `public`).

use crate::error::{AppError, ConfigError};
use crate::store::{AttributeStore, ProvisionPlan, TenantStore};
use crate::tenant::{quote_ident, NamespaceName, TenantRecord, PLACEHOLDER_NAMES};
use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

const TENANT_TABLE: &str = "tenant";
const USER_ATTRIBUTES_TABLE: &str = "user_attributes";
const TENANT_COLUMNS: &str = "id, name, owner_id, rls_enabled, created_at, updated_at";

fn qualified_table(meta_schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(meta_schema), quote_ident(table))
}

fn placeholder_params() -> Vec<String> {
    PLACEHOLDER_NAMES.iter().map(|p| p.to_lowercase()).collect()
}

/// Create the metadata schema if not exists, then the `tenant` and `user_attributes` tables.
pub async fn ensure_meta_tables(pool: &PgPool, meta_schema: &str) -> Result<(), AppError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(meta_schema)))
        .execute(pool)
        .await?;

    let q_tenant = qualified_table(meta_schema, TENANT_TABLE);
    let tenant_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            owner_id TEXT,
            rls_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        q_tenant
    );
    sqlx::query(&tenant_ddl).execute(pool).await?;
    // Older deployments created the table before RLS tracking existed.
    let alter_rls = format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS rls_enabled BOOLEAN NOT NULL DEFAULT TRUE",
        q_tenant
    );
    let _ = sqlx::query(&alter_rls).execute(pool).await;

    let q_attrs = qualified_table(meta_schema, USER_ATTRIBUTES_TABLE);
    let attrs_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            user_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (user_id, key)
        )
        "#,
        q_attrs
    );
    sqlx::query(&attrs_ddl).execute(pool).await?;
    Ok(())
}

/// Tenant store over a shared pool. Grants on new schemas go to `admin_role`.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
    meta_schema: String,
    admin_role: String,
}

impl PgTenantStore {
    pub fn new(pool: PgPool, meta_schema: impl Into<String>, admin_role: impl Into<String>) -> Self {
        PgTenantStore {
            pool,
            meta_schema: meta_schema.into(),
            admin_role: admin_role.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn tenant_table(&self) -> String {
        qualified_table(&self.meta_schema, TENANT_TABLE)
    }

    async fn provision_in_tx(
        &self,
        tx: &mut sqlx::PgConnection,
        plan: &ProvisionPlan,
    ) -> Result<Option<TenantRecord>, AppError> {
        let schema = plan.namespace.quoted();
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
            .execute(&mut *tx)
            .await?;

        let record = match plan.business_name.as_deref() {
            Some(name) => {
                let sql = format!(
                    r#"
                    INSERT INTO {} (id, name, owner_id, rls_enabled, created_at, updated_at)
                    VALUES ($1, $2, $3, TRUE, NOW(), NOW())
                    ON CONFLICT (id)
                    DO UPDATE SET name = EXCLUDED.name, rls_enabled = TRUE, updated_at = NOW()
                    RETURNING {}
                    "#,
                    self.tenant_table(),
                    TENANT_COLUMNS
                );
                let row: TenantRecord = sqlx::query_as(&sql)
                    .bind(plan.tenant_id)
                    .bind(name)
                    .bind(plan.owner_id.as_deref())
                    .fetch_one(&mut *tx)
                    .await?;
                Some(row)
            }
            None => None,
        };

        let role = quote_ident(&self.admin_role);
        for grant in [
            format!("GRANT USAGE ON SCHEMA {} TO {}", schema, role),
            format!("GRANT ALL ON ALL TABLES IN SCHEMA {} TO {}", schema, role),
            format!(
                "ALTER DEFAULT PRIVILEGES IN SCHEMA {} GRANT ALL ON TABLES TO {}",
                schema, role
            ),
        ] {
            sqlx::query(&grant).execute(&mut *tx).await?;
        }
        Ok(record)
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn schema_exists(&self, namespace: &NamespaceName) -> Result<bool, AppError> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(namespace.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists.0)
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, AppError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", TENANT_COLUMNS, self.tenant_table());
        let row = sqlx::query_as::<_, TenantRecord>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn backfill_name(
        &self,
        tenant_id: Uuid,
        name: &str,
        owner_id: Option<&str>,
    ) -> Result<Option<TenantRecord>, AppError> {
        let q_tenant = self.tenant_table();
        let sql = format!(
            r#"
            INSERT INTO {} (id, name, owner_id, rls_enabled, created_at, updated_at)
            VALUES ($1, $2, $3, TRUE, NOW(), NOW())
            ON CONFLICT (id)
            DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
            WHERE btrim({}.name) = '' OR lower(btrim({}.name)) = ANY($4)
            RETURNING {}
            "#,
            q_tenant,
            quote_ident(TENANT_TABLE),
            quote_ident(TENANT_TABLE),
            TENANT_COLUMNS
        );
        let row = sqlx::query_as::<_, TenantRecord>(&sql)
            .bind(tenant_id)
            .bind(name)
            .bind(owner_id)
            .bind(placeholder_params())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn provision(&self, plan: &ProvisionPlan) -> Result<Option<TenantRecord>, AppError> {
        let mut tx = self.pool.begin().await?;
        match self.provision_in_tx(&mut tx, plan).await {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::error!("rollback of {} failed: {}", plan.namespace, rb);
                }
                Err(e)
            }
        }
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

/// `user_attributes` table accessor.
#[derive(Clone)]
pub struct PgAttributeStore {
    pool: PgPool,
    meta_schema: String,
}

impl PgAttributeStore {
    pub fn new(pool: PgPool, meta_schema: impl Into<String>) -> Self {
        PgAttributeStore {
            pool,
            meta_schema: meta_schema.into(),
        }
    }
}

#[async_trait]
impl AttributeStore for PgAttributeStore {
    async fn get_attribute(&self, user_id: &str, key: &str) -> Result<Option<String>, AppError> {
        let sql = format!(
            "SELECT value FROM {} WHERE user_id = $1 AND key = $2",
            qualified_table(&self.meta_schema, USER_ATTRIBUTES_TABLE)
        );
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn set_attribute(&self, user_id: &str, key: &str, value: &str) -> Result<(), AppError> {
        let sql = format!(
            r#"
            INSERT INTO {} (user_id, key, value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, key)
            DO UPDATE SET value = $3, updated_at = NOW()
            "#,
            qualified_table(&self.meta_schema, USER_ATTRIBUTES_TABLE)
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Create the database named in `database_url` when it is missing. The check and
/// `CREATE DATABASE` run over a connection to the server's `postgres` database,
/// so this must happen before the main pool connects. Returns whether it was created.
pub async fn ensure_database_exists(database_url: &str) -> Result<bool, AppError> {
    let Some((admin, db_name)) = admin_options(database_url)? else {
        return Ok(false);
    };
    let mut conn: sqlx::PgConnection = admin.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if exists.0 {
        return Ok(false);
    }
    tracing::info!("creating database {}", db_name);
    sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
        .execute(&mut conn)
        .await?;
    Ok(true)
}

/// Connection options for the maintenance database plus the target database name,
/// or `None` when the URL already points at `postgres` or names no database.
fn admin_options(database_url: &str) -> Result<Option<(PgConnectOptions, String)>, AppError> {
    let opts = PgConnectOptions::from_str(database_url).map_err(|e| ConfigError::InvalidValue {
        var: "DATABASE_URL",
        reason: e.to_string(),
    })?;
    let db_name = match opts.get_database().map(str::trim) {
        Some(name) if !name.is_empty() && name != "postgres" => name.to_string(),
        _ => return Ok(None),
    };
    Ok(Some((opts.database("postgres"), db_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_options_switch_to_maintenance_database() {
        let (admin, db) = admin_options("postgres://u:p@db.internal:6543/tenants?sslmode=disable")
            .unwrap()
            .unwrap();
        assert_eq!(db, "tenants");
        assert_eq!(admin.get_database(), Some("postgres"));
        assert_eq!(admin.get_host(), "db.internal");
        assert_eq!(admin.get_port(), 6543);
        assert_eq!(admin.get_username(), "u");

        assert!(admin_options("postgres://u@localhost/postgres").unwrap().is_none());
        assert!(matches!(admin_options("not a url"), Err(AppError::Config(_))));
    }

    #[test]
    fn qualified_names_are_quoted() {
        assert_eq!(qualified_table("public", "tenant"), "\"public\".\"tenant\"");
    }
}
