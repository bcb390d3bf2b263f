//! Persistence helpers shared by every resource router.

use crate::config::{Operation, ResolvedCatalog, ResolvedResource};
use crate::error::AppError;
use crate::query::{DateRangeMode, ListParams, QueryBuilder, SOURCE_FIELD};
use crate::service::RequestValidator;
use crate::store::{Document, DocumentStore, Page, RESERVED_FIELDS};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct CrudService {
    store: Arc<dyn DocumentStore>,
    date_range_mode: DateRangeMode,
}

fn ensure_allowed(resource: &ResolvedResource, op: Operation) -> Result<(), AppError> {
    if resource.allows(op) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "{} not allowed on {}",
            op.as_str(),
            resource.path_segment
        )))
    }
}

/// Body as a JSON object with store-owned fields removed.
fn client_fields(body: Value) -> Result<Map<String, Value>, AppError> {
    match body {
        Value::Object(mut m) => {
            for f in RESERVED_FIELDS {
                m.remove(*f);
            }
            Ok(m)
        }
        _ => Err(AppError::Validation("body must be a JSON object".into())),
    }
}

impl CrudService {
    pub fn new(store: Arc<dyn DocumentStore>, date_range_mode: DateRangeMode) -> Self {
        CrudService { store, date_range_mode }
    }

    /// Create every catalog collection and its unique indexes.
    pub async fn ensure_collections(&self, catalog: &ResolvedCatalog) -> Result<(), AppError> {
        for r in &catalog.resources {
            self.store.ensure_collection(&r.collection).await?;
            tracing::debug!(collection = %r.collection.name, "collection ready");
        }
        Ok(())
    }

    /// Insert a record and return it as stored.
    pub async fn create(&self, resource: &ResolvedResource, body: Value) -> Result<Document, AppError> {
        ensure_allowed(resource, Operation::Create)?;
        let body = client_fields(body)?;
        RequestValidator::validate(&body, &resource.validation)?;
        let collection = resource.collection_name();
        let id = self.store.insert_one(collection, body).await?;
        let doc = self
            .store
            .find_one(collection, id)
            .await?
            .ok_or_else(|| AppError::AddFailed(collection.to_string()))?;
        tracing::info!(collection, id = %id, "record created");
        Ok(doc)
    }

    pub async fn get(&self, resource: &ResolvedResource, id: Uuid) -> Result<Document, AppError> {
        ensure_allowed(resource, Operation::Read)?;
        self.store
            .find_one(resource.collection_name(), id)
            .await?
            .ok_or_else(|| not_found(resource, id))
    }

    /// Records matching the filters, ordered by `created` then `id`.
    pub async fn find(&self, resource: &ResolvedResource, params: &ListParams) -> Result<Vec<Document>, AppError> {
        ensure_allowed(resource, Operation::Read)?;
        let query = params.filters.to_query(QueryBuilder::new(self.date_range_mode));
        Ok(self.store.find(resource.collection_name(), &query, params.page).await?)
    }

    /// Shallow-merge a partial record; nothing is written when the id is unknown.
    pub async fn update(&self, resource: &ResolvedResource, id: Uuid, patch: Value) -> Result<Document, AppError> {
        ensure_allowed(resource, Operation::Update)?;
        let patch = client_fields(patch)?;
        RequestValidator::validate_partial(&patch, &resource.validation)?;
        let collection = resource.collection_name();
        let doc = self
            .store
            .update_one(collection, id, patch)
            .await?
            .ok_or_else(|| not_found(resource, id))?;
        tracing::info!(collection, id = %id, "record updated");
        Ok(doc)
    }

    pub async fn delete(&self, resource: &ResolvedResource, id: Uuid) -> Result<(), AppError> {
        ensure_allowed(resource, Operation::Delete)?;
        let collection = resource.collection_name();
        if !self.store.delete_one(collection, id).await? {
            return Err(not_found(resource, id));
        }
        tracing::info!(collection, id = %id, "record deleted");
        Ok(())
    }

    /// Delete every record tagged with `meta.source == source`. Returns the count removed.
    pub async fn purge_source(&self, resource: &ResolvedResource, source: &str) -> Result<u64, AppError> {
        ensure_allowed(resource, Operation::Delete)?;
        let source = source.trim();
        if source.is_empty() {
            return Err(AppError::Validation("source must not be empty".into()));
        }
        let query = QueryBuilder::new(self.date_range_mode).eq(SOURCE_FIELD, Some(source)).build();
        let collection = resource.collection_name();
        let deleted = self.store.delete_many(collection, &query).await?;
        tracing::info!(collection, source, deleted, "purged records by source");
        Ok(deleted)
    }
}

fn not_found(resource: &ResolvedResource, id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {}", resource.path_segment, id))
}

/// Offset of the following page, when this one came back full.
pub fn next_offset(page: Page, returned: usize) -> Option<u32> {
    (returned as u32 >= page.limit).then(|| page.offset + page.limit)
}
