//! Document store abstraction: one collection per resource, JSON documents keyed by a store-assigned UUID.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgDocumentStore};

use crate::config::CollectionSpec;
use crate::error::StoreError;
use crate::query::{parse_timestamp, Query};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Fields owned by the store; never taken from client input.
pub const RESERVED_FIELDS: &[&str] = &["id", "created", "modified"];

/// A persisted record: store-owned metadata plus the resource fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Document {
    pub fn new(body: Map<String, Value>) -> Self {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            created: now,
            modified: now,
            body,
        }
    }

    /// Text of the scalar at a dotted path; `id`, `created` and `modified` resolve to metadata.
    pub fn scalar_text(&self, path: &str) -> Option<String> {
        match path {
            "id" => Some(self.id.to_string()),
            "created" => Some(self.created.to_rfc3339()),
            "modified" => Some(self.modified.to_rfc3339()),
            _ => lookup_path(&self.body, path).and_then(scalar_to_text),
        }
    }

    pub fn timestamp(&self, path: &str) -> Option<DateTime<Utc>> {
        match path {
            "created" => Some(self.created),
            "modified" => Some(self.modified),
            _ => lookup_path(&self.body, path)
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
        }
    }

    /// Shallow merge of `patch` into the body, advancing `modified` strictly.
    pub fn merge(&mut self, patch: Map<String, Value>) {
        for (k, v) in patch {
            self.body.insert(k, v);
        }
        self.modified = next_modified(self.modified, Utc::now());
    }

    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `modified` after an update: now, but never at or before the previous value.
pub fn next_modified(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::microseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}

/// Value at a dotted path inside a JSON object.
pub fn lookup_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Text form used for equality filters and unique keys; matches Postgres `#>>` output.
pub fn scalar_to_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Explicit pagination window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// Limit defaults to 100 and is clamped to 1..=1000; offset defaults to 0.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Page {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(None, None)
    }
}

/// Keyed JSON document storage. Implementations own id assignment and uniqueness.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the collection and its unique indexes if missing.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError>;

    /// Insert a new document; returns the assigned id.
    async fn insert_one(&self, collection: &str, body: Map<String, Value>) -> Result<Uuid, StoreError>;

    async fn find_one(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Matching documents ordered by `created` then `id`.
    async fn find(&self, collection: &str, query: &Query, page: Page) -> Result<Vec<Document>, StoreError>;

    /// Shallow-merge `patch` into the document. `None` when no document has that id.
    async fn update_one(
        &self,
        collection: &str,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError>;

    /// Returns whether a document was removed.
    async fn delete_one(&self, collection: &str, id: Uuid) -> Result<bool, StoreError>;

    /// Returns the number of documents removed.
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn document_serializes_flat() {
        let doc = Document::new(body(json!({"tag": "D1", "vendor": "Acme"})));
        let v = doc.clone().into_value();
        assert_eq!(v["tag"], "D1");
        assert_eq!(v["id"], doc.id.to_string());
        let back: Document = serde_json::from_value(v).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn scalar_text_follows_paths() {
        let doc = Document::new(body(json!({
            "identifier": {"id": "UK123", "scheme": "uk"},
            "predicted": false,
            "value": 1.5,
            "tags": ["a"]
        })));
        assert_eq!(doc.scalar_text("identifier.id").as_deref(), Some("UK123"));
        assert_eq!(doc.scalar_text("predicted").as_deref(), Some("false"));
        assert_eq!(doc.scalar_text("value").as_deref(), Some("1.5"));
        assert_eq!(doc.scalar_text("tags"), None);
        assert_eq!(doc.scalar_text("identifier.missing"), None);
        assert_eq!(doc.scalar_text("id"), Some(doc.id.to_string()));
    }

    #[test]
    fn modified_strictly_advances() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(next_modified(t, t), t + Duration::microseconds(1));
        assert_eq!(next_modified(t, t - Duration::seconds(5)), t + Duration::microseconds(1));
        let later = t + Duration::seconds(1);
        assert_eq!(next_modified(t, later), later);
    }

    #[test]
    fn merge_is_shallow_and_keeps_created() {
        let mut doc = Document::new(body(json!({"tag": "D1", "vendor": "Acme", "model": "M1"})));
        let created = doc.created;
        let before = doc.modified;
        doc.merge(body(json!({"vendor": "Acme2"})));
        assert_eq!(doc.body["tag"], "D1");
        assert_eq!(doc.body["vendor"], "Acme2");
        assert_eq!(doc.created, created);
        assert!(doc.modified > before);
    }

    #[test]
    fn page_clamps() {
        assert_eq!(Page::new(None, None), Page { limit: 100, offset: 0 });
        assert_eq!(Page::new(Some(5000), Some(10)), Page { limit: 1000, offset: 10 });
        assert_eq!(Page::new(Some(0), None).limit, 1);
    }
}
