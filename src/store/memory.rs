//! In-process document store. Enforces unique keys the way the Postgres indexes do.

use crate::config::{CollectionSpec, UniqueKey};
use crate::error::StoreError;
use crate::query::Query;
use crate::store::{Document, DocumentStore, Page};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Collection {
    unique_keys: Vec<UniqueKey>,
    docs: HashMap<Uuid, Document>,
}

impl Collection {
    /// First unique key `doc` would collide on, ignoring the document with its own id.
    fn conflicting_key(&self, doc: &Document) -> Option<&UniqueKey> {
        self.unique_keys.iter().find(|key| {
            let Some(values) = key_values(key, doc) else {
                return false;
            };
            self.docs
                .values()
                .any(|other| other.id != doc.id && key_values(key, other).as_ref() == Some(&values))
        })
    }
}

/// Values of every field of `key`, or `None` when any is missing (such documents never collide).
fn key_values(key: &UniqueKey, doc: &Document) -> Option<Vec<String>> {
    key.fields.iter().map(|f| doc.scalar_text(f)).collect()
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown(collection: &str) -> StoreError {
    StoreError::UnknownCollection(collection.to_string())
}

fn duplicate(collection: &str, key: &UniqueKey) -> StoreError {
    StoreError::Duplicate {
        collection: collection.to_string(),
        key: key.name.clone(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let c = collections.entry(spec.name.clone()).or_default();
        c.unique_keys = spec.unique_keys.clone();
        Ok(())
    }

    async fn insert_one(&self, collection: &str, body: Map<String, Value>) -> Result<Uuid, StoreError> {
        let mut collections = self.collections.write().await;
        let c = collections.get_mut(collection).ok_or_else(|| unknown(collection))?;
        let doc = Document::new(body);
        if let Some(key) = c.conflicting_key(&doc) {
            return Err(duplicate(collection, key));
        }
        let id = doc.id;
        c.docs.insert(id, doc);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        let c = collections.get(collection).ok_or_else(|| unknown(collection))?;
        Ok(c.docs.get(&id).cloned())
    }

    async fn find(&self, collection: &str, query: &Query, page: Page) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let c = collections.get(collection).ok_or_else(|| unknown(collection))?;
        let mut matched: Vec<&Document> = c.docs.values().filter(|d| query.matches(d)).collect();
        matched.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        Ok(matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().await;
        let c = collections.get_mut(collection).ok_or_else(|| unknown(collection))?;
        let Some(existing) = c.docs.get(&id) else {
            return Ok(None);
        };
        let mut updated = existing.clone();
        updated.merge(patch);
        if let Some(key) = c.conflicting_key(&updated) {
            return Err(duplicate(collection, key));
        }
        c.docs.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_one(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let c = collections.get_mut(collection).ok_or_else(|| unknown(collection))?;
        Ok(c.docs.remove(&id).is_some())
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let c = collections.get_mut(collection).ok_or_else(|| unknown(collection))?;
        let before = c.docs.len();
        c.docs.retain(|_, d| !query.matches(d));
        Ok((before - c.docs.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
