//! Response envelopes.

use crate::service::next_offset;
use crate::store::Page;
use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, serde::Serialize)]
pub struct ListMeta {
    pub count: usize,
    pub limit: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u32>,
}

/// `{ "<name>": [...], "meta": {...} }`, keyed by the resource path.
#[derive(Debug)]
pub struct NamedList<T> {
    pub name: String,
    pub items: Vec<T>,
    pub meta: ListMeta,
}

impl<T> NamedList<T> {
    pub fn new(name: impl Into<String>, items: Vec<T>, page: Page) -> Self {
        let count = items.len();
        NamedList {
            name: name.into(),
            items,
            meta: ListMeta {
                count,
                limit: page.limit,
                offset: page.offset,
                next_offset: next_offset(page, count),
            },
        }
    }
}

impl<T: Serialize> Serialize for NamedList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(&self.name, &self.items)?;
        map.serialize_entry("meta", &self.meta)?;
        map.end()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_is_keyed_by_name() {
        let body = NamedList::new("devices", vec![json!({"tag": "D1"})], Page::new(Some(1), None));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"devices": [{"tag": "D1"}], "meta": {"count": 1, "limit": 1, "offset": 0, "next_offset": 1}})
        );
    }

    #[test]
    fn short_page_has_no_next_offset() {
        let body = NamedList::new("samples", Vec::<u8>::new(), Page::default());
        let v = serde_json::to_value(&body).unwrap();
        assert!(v["meta"].get("next_offset").is_none());
        assert_eq!(v["samples"], json!([]));
    }
}
