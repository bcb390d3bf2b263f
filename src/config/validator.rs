//! Catalog validation: unique paths and collections, well-formed field paths, known operations.

use crate::config::{CatalogConfig, Operation};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Collection names reserved for the service itself.
pub const RESERVED_COLLECTIONS: &[&str] = &["users"];

fn field_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("static regex")
    })
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex"))
}

/// True if `path` is a dotted field path safe to embed in store queries.
pub fn is_valid_field_path(path: &str) -> bool {
    field_path_re().is_match(path)
}

pub fn default_collection_name(path_segment: &str) -> String {
    path_segment.replace('-', "_")
}

pub fn validate(config: &CatalogConfig) -> Result<(), ConfigError> {
    let mut paths = HashSet::new();
    let mut collections = HashSet::new();

    for r in &config.resources {
        if r.path_segment.is_empty()
            || !r
                .path_segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::Load(format!("invalid path segment '{}'", r.path_segment)));
        }
        if RESERVED_COLLECTIONS.contains(&r.path_segment.as_str()) {
            return Err(ConfigError::ReservedPathSegment(r.path_segment.clone()));
        }
        if !paths.insert(r.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(r.path_segment.clone()));
        }

        let collection = r
            .collection
            .clone()
            .unwrap_or_else(|| default_collection_name(&r.path_segment));
        if !identifier_re().is_match(&collection) || RESERVED_COLLECTIONS.contains(&collection.as_str()) {
            return Err(ConfigError::Load(format!("invalid collection name '{}'", collection)));
        }
        if !collections.insert(collection) {
            return Err(ConfigError::Load(format!(
                "collection of '{}' is used by another resource",
                r.path_segment
            )));
        }

        if !identifier_re().is_match(&r.scope_family) {
            return Err(ConfigError::Load(format!("invalid scope family '{}'", r.scope_family)));
        }

        for op in &r.operations {
            if Operation::parse(op).is_none() {
                return Err(ConfigError::Load(format!("unknown operation '{}' on {}", op, r.path_segment)));
            }
        }

        let declared = r
            .filters
            .iter()
            .chain(r.date_filters.iter())
            .chain(r.unique.iter().flatten())
            .chain(r.validation.keys());
        for field in declared {
            if !is_valid_field_path(field) {
                return Err(ConfigError::InvalidFieldPath(field.clone()));
            }
        }

        for key in &r.unique {
            if key.is_empty() {
                return Err(ConfigError::Load(format!("empty unique key on {}", r.path_segment)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;

    fn resource(path: &str) -> ResourceConfig {
        ResourceConfig {
            path_segment: path.into(),
            collection: None,
            scope_family: "devices".into(),
            operations: crate::config::default_operations(),
            filters: vec!["tag".into()],
            date_filters: vec![],
            unique: vec![vec!["tag".into(), "vendor".into()]],
            validation: Default::default(),
        }
    }

    #[test]
    fn field_paths() {
        assert!(is_valid_field_path("tag"));
        assert!(is_valid_field_path("identifier.id"));
        assert!(!is_valid_field_path("a..b"));
        assert!(!is_valid_field_path("x'; drop"));
        assert!(!is_valid_field_path(""));
    }

    #[test]
    fn rejects_duplicate_paths() {
        let config = CatalogConfig {
            resources: vec![resource("devices"), resource("devices")],
        };
        assert!(matches!(validate(&config), Err(ConfigError::DuplicatePathSegment(_))));
    }

    #[test]
    fn rejects_users_path() {
        let config = CatalogConfig {
            resources: vec![resource("users")],
        };
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedPathSegment(ref p) if p == "users"));
        assert_eq!(err.to_string(), "path segment 'users' is reserved");
    }

    #[test]
    fn rejects_bad_filter_field() {
        let mut r = resource("devices");
        r.filters.push("tag; --".into());
        let config = CatalogConfig { resources: vec![r] };
        assert!(matches!(validate(&config), Err(ConfigError::InvalidFieldPath(_))));
    }

    #[test]
    fn rejects_unknown_operation() {
        let mut r = resource("devices");
        r.operations.push("bulk_create".into());
        let config = CatalogConfig { resources: vec![r] };
        assert!(validate(&config).is_err());
    }
}
