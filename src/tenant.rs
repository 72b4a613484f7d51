//! Tenant identity: strict UUID validation, deterministic id repair, namespace derivation, metadata row.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// Fixed UUIDv5 namespace under which tenant ids are derived from user identifiers.
pub const TENANT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c2e3a_8b1d_4c6e_9f21_7d4a3b6c8e10);

/// Prefix of every per-tenant PostgreSQL schema.
pub const NAMESPACE_PREFIX: &str = "tenant_";

/// Business names that stand in for "not provided yet". Compared case-insensitively.
pub const PLACEHOLDER_NAMES: &[&str] = &["Default Business", "My Business", "New Business", "Your Business"];

const UUID_BODY: &str = r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-8][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}";

fn uuid_exact() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{}$", UUID_BODY)).expect("static regex"))
}

/// Parse an RFC-4122 UUID in canonical hyphenated form. Braced, URN and simple forms are rejected.
pub fn parse_tenant_id(raw: &str) -> Option<Uuid> {
    let raw = raw.trim();
    if !uuid_exact().is_match(raw) {
        return None;
    }
    Uuid::parse_str(raw).ok()
}

/// Deterministic tenant id for a user identifier (UUIDv5 under [`TENANT_ID_NAMESPACE`]).
pub fn derive_tenant_id(namespace: &Uuid, user_id: &str) -> Uuid {
    Uuid::new_v5(namespace, user_id.trim().as_bytes())
}

/// Use `raw` when it is a valid tenant id, otherwise derive one from `user_id` when given.
pub fn repair_tenant_id(raw: Option<&str>, user_id: Option<&str>) -> Option<Uuid> {
    if let Some(id) = raw.and_then(parse_tenant_id) {
        return Some(id);
    }
    user_id
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| derive_tenant_id(&TENANT_ID_NAMESPACE, u))
}

/// Scan a URL path for the first segment shaped like a tenant id.
pub fn tenant_id_in_path(path: &str) -> Option<Uuid> {
    path.split(|c: char| matches!(c, '/' | '?' | '#' | '&' | '='))
        .find_map(parse_tenant_id)
}

/// Name of a tenant's PostgreSQL schema. Always derived from the tenant id, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespaceName(String);

impl NamespaceName {
    pub fn for_tenant(tenant_id: &Uuid) -> Self {
        let body: String = tenant_id
            .to_string()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        NamespaceName(format!("{}{}", NAMESPACE_PREFIX, body))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted identifier for use in DDL.
    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// True for empty names and the known placeholders.
pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || PLACEHOLDER_NAMES.iter().any(|p| p.eq_ignore_ascii_case(name))
}

/// A supplied business name, unless it is blank or a placeholder.
pub fn real_business_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !is_placeholder_name(n))
        .map(String::from)
}

/// Row of the `tenant` metadata table. Serialized with its column names.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct TenantRecord {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Option<String>,
    pub rls_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord {
    pub fn namespace(&self) -> NamespaceName {
        NamespaceName::for_tenant(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "9a551c44-4ade-4f89-b078-0af8be794c23";

    #[test]
    fn namespace_is_derived_from_id() {
        let id = parse_tenant_id(SAMPLE).unwrap();
        let ns = NamespaceName::for_tenant(&id);
        assert_eq!(ns.as_str(), "tenant_9a551c44_4ade_4f89_b078_0af8be794c23");
        assert_eq!(ns, NamespaceName::for_tenant(&id));
        assert_eq!(ns.quoted(), "\"tenant_9a551c44_4ade_4f89_b078_0af8be794c23\"");
    }

    #[test]
    fn rejects_non_canonical_ids() {
        assert!(parse_tenant_id("not-a-uuid").is_none());
        assert!(parse_tenant_id("").is_none());
        assert!(parse_tenant_id("9a551c444ade4f89b0780af8be794c23").is_none());
        assert!(parse_tenant_id("{9a551c44-4ade-4f89-b078-0af8be794c23}").is_none());
        // variant nibble must be 8, 9, a or b
        assert!(parse_tenant_id("9a551c44-4ade-4f89-7078-0af8be794c23").is_none());
        assert!(parse_tenant_id(" 9A551C44-4ADE-4F89-B078-0AF8BE794C23 ").is_some());
    }

    #[test]
    fn repair_prefers_valid_id_then_user() {
        let valid = parse_tenant_id(SAMPLE);
        assert_eq!(repair_tenant_id(Some(SAMPLE), Some("auth0|42")), valid);

        let derived = repair_tenant_id(Some("garbage"), Some("auth0|42")).unwrap();
        assert_eq!(derived, derive_tenant_id(&TENANT_ID_NAMESPACE, "auth0|42"));
        assert_eq!(derived.get_version_num(), 5);
        assert!(parse_tenant_id(&derived.to_string()).is_some());

        assert_eq!(repair_tenant_id(None, Some("  ")), None);
        assert_eq!(repair_tenant_id(None, None), None);
    }

    #[test]
    fn finds_id_in_path() {
        let path = format!("/{}/dashboard?tab=hr", SAMPLE);
        assert_eq!(tenant_id_in_path(&path), parse_tenant_id(SAMPLE));
        assert_eq!(tenant_id_in_path("/dashboard/settings"), None);
    }

    #[test]
    fn placeholder_names() {
        assert!(is_placeholder_name(""));
        assert!(is_placeholder_name("  my business "));
        assert!(!is_placeholder_name("Acme"));
        assert_eq!(real_business_name(Some(" Acme ")), Some("Acme".to_string()));
        assert_eq!(real_business_name(Some("Default Business")), None);
        assert_eq!(real_business_name(None), None);
    }
}
