//! Resolved resource catalog: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use std::collections::HashMap;

/// Operation a resource may expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Operation::Create),
            "read" => Some(Operation::Read),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// A named set of fields declared unique for a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueKey {
    pub name: String,
    pub fields: Vec<String>,
}

impl UniqueKey {
    pub fn new(fields: Vec<String>) -> Self {
        UniqueKey {
            name: fields.join("+"),
            fields,
        }
    }
}

/// How a collection is persisted: name plus declared unique keys.
#[derive(Clone, Debug)]
pub struct CollectionSpec {
    pub name: String,
    pub unique_keys: Vec<UniqueKey>,
}

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub path_segment: String,
    pub collection: CollectionSpec,
    pub scope_family: String,
    pub operations: Vec<Operation>,
    pub eq_filters: Vec<String>,
    pub date_filters: Vec<String>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedResource {
    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn read_scope(&self) -> String {
        format!("read_{}", self.scope_family)
    }

    pub fn write_scope(&self) -> String {
        format!("write_{}", self.scope_family)
    }

    pub fn collection_name(&self) -> &str {
        &self.collection.name
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedCatalog {
    pub resources: Vec<ResolvedResource>,
    pub resource_by_path: HashMap<String, ResolvedResource>,
}

impl ResolvedCatalog {
    pub fn resource_by_path(&self, path: &str) -> Option<&ResolvedResource> {
        self.resource_by_path.get(path)
    }

    /// Every `read_*` and `write_*` scope declared by the catalog, sorted.
    pub fn all_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .resources
            .iter()
            .flat_map(|r| [r.read_scope(), r.write_scope()])
            .collect();
        scopes.sort();
        scopes.dedup();
        scopes
    }
}
