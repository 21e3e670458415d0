//! Engine settings from the environment (`.env` honored via dotenvy).

use crate::error::ConfigError;

/// Names of the four server-managed audit columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditFields {
    pub created_date: String,
    pub last_modified_date: String,
    pub created_by_id: String,
    pub last_modified_by_id: String,
}

impl Default for AuditFields {
    fn default() -> Self {
        AuditFields {
            created_date: "created_date".into(),
            last_modified_date: "last_modified_date".into(),
            created_by_id: "created_by_id".into(),
            last_modified_by_id: "last_modified_by_id".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub database_url: String,
    /// Dialect override; when unset the dialect follows the connection's backend.
    pub driver: Option<String>,
    pub max_connections: u32,
    pub default_limit: u64,
    pub max_limit: u64,
    pub max_batch: usize,
    pub audit: AuditFields,
}

impl EngineSettings {
    pub fn new(database_url: impl Into<String>) -> Self {
        EngineSettings {
            database_url: database_url.into(),
            driver: None,
            max_connections: 5,
            default_limit: 100,
            max_limit: 1000,
            max_batch: 1000,
            audit: AuditFields::default(),
        }
    }

    /// Load `.env` (if present) and then read the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key lookup; `load` uses the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = get("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let mut s = EngineSettings::new(database_url);
        s.driver = get("DB_DRIVER").filter(|v| !v.trim().is_empty());
        if let Some(v) = get("DB_MAX_CONNECTIONS") {
            s.max_connections = parse_num("DB_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("CRUD_DEFAULT_LIMIT") {
            s.default_limit = parse_num("CRUD_DEFAULT_LIMIT", &v)?;
        }
        if let Some(v) = get("CRUD_MAX_LIMIT") {
            s.max_limit = parse_num("CRUD_MAX_LIMIT", &v)?;
        }
        if let Some(v) = get("CRUD_MAX_BATCH") {
            s.max_batch = parse_num("CRUD_MAX_BATCH", &v)?;
        }
        if s.default_limit > s.max_limit {
            return Err(ConfigError::Invalid {
                key: "CRUD_DEFAULT_LIMIT",
                value: s.default_limit.to_string(),
            });
        }
        for (key, slot) in [
            ("AUDIT_CREATED_DATE_FIELD", &mut s.audit.created_date),
            ("AUDIT_LAST_MODIFIED_DATE_FIELD", &mut s.audit.last_modified_date),
            ("AUDIT_CREATED_BY_FIELD", &mut s.audit.created_by_id),
            ("AUDIT_LAST_MODIFIED_BY_FIELD", &mut s.audit.last_modified_by_id),
        ] {
            if let Some(v) = get(key).filter(|v| !v.trim().is_empty()) {
                *slot = v.trim().to_string();
            }
        }
        Ok(s)
    }
}

fn parse_num<T: std::str::FromStr + PartialOrd + Default>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    match raw.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn requires_database_url() {
        assert!(matches!(
            EngineSettings::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn reads_overrides() {
        let s = EngineSettings::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_DRIVER", "generic"),
            ("CRUD_DEFAULT_LIMIT", "20"),
            ("CRUD_MAX_BATCH", "50"),
            ("AUDIT_CREATED_BY_FIELD", "owner_id"),
        ]))
        .unwrap();
        assert_eq!(s.driver.as_deref(), Some("generic"));
        assert_eq!(s.default_limit, 20);
        assert_eq!(s.max_limit, 1000);
        assert_eq!(s.max_batch, 50);
        assert_eq!(s.audit.created_by_id, "owner_id");
        assert_eq!(s.audit.created_date, "created_date");
    }

    #[test]
    fn rejects_bad_numbers() {
        let r = EngineSettings::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:"), ("CRUD_MAX_LIMIT", "lots")]));
        assert!(matches!(r, Err(ConfigError::Invalid { key: "CRUD_MAX_LIMIT", .. })));
        let r = EngineSettings::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:"), ("CRUD_MAX_BATCH", "0")]));
        assert!(r.is_err());
    }
}
