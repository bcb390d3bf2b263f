//! Load the resource catalog from the embedded default or a JSON file, and resolve it.

use crate::config::resolved::{CollectionSpec, Operation, ResolvedCatalog, ResolvedResource, UniqueKey};
use crate::config::types::*;
use crate::config::{default_collection_name, validate};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_CATALOG: &str = include_str!("catalog.json");

/// The catalog compiled into the binary.
pub fn default_catalog() -> Result<CatalogConfig, ConfigError> {
    serde_json::from_str(DEFAULT_CATALOG).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read a catalog from `path`, or fall back to the embedded one.
pub async fn load_catalog(path: Option<&Path>) -> Result<CatalogConfig, ConfigError> {
    let Some(path) = path else {
        return default_catalog();
    };
    tracing::info!(path = %path.display(), "loading resource catalog");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Build resolved catalog from config (validates first).
pub fn resolve(config: &CatalogConfig) -> Result<ResolvedCatalog, ConfigError> {
    validate(config)?;

    let mut resources = Vec::with_capacity(config.resources.len());
    let mut resource_by_path = HashMap::new();

    for r in &config.resources {
        let operations: Vec<Operation> = r.operations.iter().filter_map(|o| Operation::parse(o)).collect();
        let unique_keys = r.unique.iter().cloned().map(UniqueKey::new).collect();

        // Range filters compare timestamps, so their values must parse as such.
        let mut validation = r.validation.clone();
        for field in &r.date_filters {
            let rule = validation.entry(field.clone()).or_default();
            if rule.format.is_none() {
                rule.format = Some("date-time".into());
            }
        }

        let resource = ResolvedResource {
            path_segment: r.path_segment.clone(),
            collection: CollectionSpec {
                name: r
                    .collection
                    .clone()
                    .unwrap_or_else(|| default_collection_name(&r.path_segment)),
                unique_keys,
            },
            scope_family: r.scope_family.clone(),
            operations,
            eq_filters: r.filters.clone(),
            date_filters: r.date_filters.clone(),
            validation,
        };
        resource_by_path.insert(r.path_segment.clone(), resource.clone());
        resources.push(resource);
    }

    Ok(ResolvedCatalog {
        resources,
        resource_by_path,
    })
}
