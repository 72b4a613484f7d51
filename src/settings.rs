//! Runtime settings read from environment variables.

use crate::error::ConfigError;
use crate::identity::TokenVerifier;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    /// Schema holding the `tenant` and `user_attributes` tables.
    pub meta_schema: String,
    /// Role that receives privileges on every new tenant schema.
    pub admin_role: String,
    pub lock_timeout: Duration,
    pub lock_sweep_interval: Duration,
    pub tenant_cache_capacity: u64,
    pub tenant_cache_ttl: Duration,
    /// HS256 secret for bearer tokens. Mutually exclusive with `jwt_public_key_pem`.
    pub jwt_secret: Option<String>,
    /// RS256 public key (PEM) for bearer tokens.
    pub jwt_public_key_pem: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source. Unset or blank variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|e| ConfigError::InvalidValue {
                var: "BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        // PEM bodies often arrive with escaped newlines from .env files.
        let jwt_public_key_pem = get("JWT_PUBLIC_KEY_PEM").map(|pem| pem.replace("\\n", "\n"));
        let jwt_secret = get("JWT_SECRET");

        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/tenants".into()),
            bind_addr,
            max_connections: parse_number(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 5)?,
            meta_schema: identifier(get("TENANT_META_SCHEMA"), "TENANT_META_SCHEMA", "public")?,
            admin_role: identifier(get("TENANT_ADMIN_ROLE"), "TENANT_ADMIN_ROLE", "postgres")?,
            lock_timeout: Duration::from_secs(parse_number(
                get("SCHEMA_LOCK_TIMEOUT_SECS"),
                "SCHEMA_LOCK_TIMEOUT_SECS",
                30,
            )?),
            lock_sweep_interval: Duration::from_secs(parse_number(
                get("SCHEMA_LOCK_SWEEP_SECS"),
                "SCHEMA_LOCK_SWEEP_SECS",
                60,
            )?),
            tenant_cache_capacity: parse_number(get("TENANT_CACHE_CAPACITY"), "TENANT_CACHE_CAPACITY", 10_000)?,
            tenant_cache_ttl: Duration::from_secs(parse_number(
                get("TENANT_CACHE_TTL_SECS"),
                "TENANT_CACHE_TTL_SECS",
                3600,
            )?),
            jwt_secret,
            jwt_public_key_pem,
        })
    }

    /// Verifier for bearer tokens. Without a configured key, signatures are not checked.
    pub fn token_verifier(&self) -> Result<TokenVerifier, ConfigError> {
        match (&self.jwt_secret, &self.jwt_public_key_pem) {
            (Some(secret), None) => Ok(TokenVerifier::hs256(secret.as_bytes())),
            (None, Some(pem)) => TokenVerifier::rs256_pem(pem),
            (None, None) => {
                tracing::warn!("no JWT key configured; bearer token signatures are not verified");
                Ok(TokenVerifier::unverified())
            }
            (Some(_), Some(_)) => Err(ConfigError::InvalidValue {
                var: "JWT_SECRET",
                reason: "set either JWT_SECRET or JWT_PUBLIC_KEY_PEM, not both".into(),
            }),
        }
    }
}

fn parse_number<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let n: T = raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        reason: e.to_string(),
    })?;
    if n <= T::default() {
        return Err(ConfigError::InvalidValue {
            var,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(n)
}

/// Names interpolated into DDL must be plain identifiers.
fn identifier(raw: Option<String>, var: &'static str, default: &str) -> Result<String, ConfigError> {
    let value = raw.unwrap_or_else(|| default.to_string());
    let mut chars = value.chars();
    let valid_start = chars.next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || value.len() > 63 {
        return Err(ConfigError::InvalidValue {
            var,
            reason: format!("'{}' is not a valid identifier", value),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr.port(), 3000);
        assert_eq!(s.max_connections, 5);
        assert_eq!(s.meta_schema, "public");
        assert_eq!(s.lock_timeout, Duration::from_secs(30));
        assert_eq!(s.lock_sweep_interval, Duration::from_secs(60));
        assert_eq!(s.tenant_cache_capacity, 10_000);
        assert_eq!(s.tenant_cache_ttl, Duration::from_secs(3600));
        assert!(!s.token_verifier().unwrap().is_verifying());
    }

    #[test]
    fn token_key_selection() {
        let s = settings(&[("JWT_SECRET", "s3cret"), ("TENANT_CACHE_CAPACITY", "64")]).unwrap();
        assert!(s.token_verifier().unwrap().is_verifying());
        assert_eq!(s.tenant_cache_capacity, 64);

        let both = settings(&[("JWT_SECRET", "s3cret"), ("JWT_PUBLIC_KEY_PEM", "x")]).unwrap();
        assert!(both.token_verifier().is_err());

        let bad_pem = settings(&[("JWT_PUBLIC_KEY_PEM", "not a key")]).unwrap();
        assert!(bad_pem.token_verifier().is_err());

        assert!(settings(&[("TENANT_CACHE_TTL_SECS", "0")]).is_err());
    }

    #[test]
    fn overrides_and_rejections() {
        let s = settings(&[("SCHEMA_LOCK_TIMEOUT_SECS", "5"), ("TENANT_ADMIN_ROLE", "app_admin")]).unwrap();
        assert_eq!(s.lock_timeout, Duration::from_secs(5));
        assert_eq!(s.admin_role, "app_admin");

        assert!(settings(&[("TENANT_ADMIN_ROLE", "x; DROP ROLE y")]).is_err());
        assert!(settings(&[("DB_MAX_CONNECTIONS", "0")]).is_err());
        assert!(settings(&[("BIND_ADDR", "nowhere")]).is_err());
    }
}
