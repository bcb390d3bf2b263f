//! Process settings read from the environment (`.env` is loaded by the binary via dotenvy).

use crate::error::ConfigError;
use crate::query::DateRangeMode;
use std::env;
use std::path::PathBuf;

/// Which document store backs the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    pub store: StoreKind,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Schema holding one table per collection.
    pub schema: String,
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    /// Scopes a self-registered account is permitted to request.
    pub default_user_scopes: Vec<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub date_range_mode: DateRangeMode,
    pub catalog_path: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let store = match get("STORE").as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE",
                    message: format!("expected postgres or memory, got {}", other),
                })
            }
        };
        let database_url = match (store, get("DATABASE_URL")) {
            (_, Some(url)) => url,
            (StoreKind::Memory, None) => String::new(),
            (StoreKind::Postgres, None) => return Err(ConfigError::Missing("DATABASE_URL")),
        };
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let date_range_mode = match get("DATE_RANGE_MODE") {
            None => DateRangeMode::OpenEnded,
            Some(v) => v.parse().map_err(|message| ConfigError::Invalid {
                key: "DATE_RANGE_MODE",
                message,
            })?,
        };

        let default_user_scopes = get("DEFAULT_USER_SCOPES")
            .map(|v| v.split([' ', ',']).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_else(|| {
                ["read_animals", "read_devices", "read_samples", "read_locations", "read_events"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        Ok(Settings {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".into()),
            store,
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            schema: get("FARM_SCHEMA").unwrap_or_else(|| "farm".into()),
            jwt_secret,
            access_token_ttl_secs: parse_or(&get, "ACCESS_TOKEN_TTL_SECS", 1800)?,
            default_user_scopes,
            admin_username: get("ADMIN_USERNAME"),
            admin_password: get("ADMIN_PASSWORD"),
            date_range_mode,
            catalog_path: get("CATALOG_PATH").map(PathBuf::from),
            max_body_bytes: parse_or(&get, "MAX_BODY_BYTES", 1024 * 1024)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let s = settings(&[("DATABASE_URL", "postgres://localhost/farm"), ("JWT_SECRET", "s")]).unwrap();
        assert_eq!(s.store, StoreKind::Postgres);
        assert_eq!(s.bind_addr, "0.0.0.0:8000");
        assert_eq!(s.schema, "farm");
        assert_eq!(s.access_token_ttl_secs, 1800);
        assert_eq!(s.date_range_mode, DateRangeMode::OpenEnded);
        assert!(s.default_user_scopes.contains(&"read_devices".to_string()));
    }

    #[test]
    fn postgres_requires_database_url() {
        assert!(matches!(
            settings(&[("JWT_SECRET", "s")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
        assert!(settings(&[("JWT_SECRET", "s"), ("STORE", "memory")]).is_ok());
    }

    #[test]
    fn jwt_secret_is_required() {
        assert!(matches!(
            settings(&[("STORE", "memory")]),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    fn parses_overrides() {
        let s = settings(&[
            ("STORE", "memory"),
            ("JWT_SECRET", "s"),
            ("DATE_RANGE_MODE", "clamped"),
            ("DEFAULT_USER_SCOPES", "read_devices write_devices"),
            ("ACCESS_TOKEN_TTL_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(s.date_range_mode, DateRangeMode::Clamped);
        assert_eq!(s.default_user_scopes, vec!["read_devices", "write_devices"]);
        assert_eq!(s.access_token_ttl_secs, 60);
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(settings(&[("STORE", "memory"), ("JWT_SECRET", "s"), ("MAX_BODY_BYTES", "lots")]).is_err());
    }
}
