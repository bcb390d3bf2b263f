//! Raw resource catalog types matching `catalog.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JSON type a field must have when present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub kind: Option<FieldKind>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub path_segment: String,
    /// Backing collection; defaults to the path segment with `-` replaced by `_`.
    #[serde(default)]
    pub collection: Option<String>,
    pub scope_family: String,
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    /// Fields accepted as equality filters on list.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Timestamp fields accepted as `<field>_start` / `<field>_end` range filters.
    #[serde(default)]
    pub date_filters: Vec<String>,
    /// Field combinations that must be unique within the collection.
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

pub fn default_operations() -> Vec<String> {
    ["create", "read", "update", "delete"].iter().map(|s| s.to_string()).collect()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub resources: Vec<ResourceConfig>,
}
