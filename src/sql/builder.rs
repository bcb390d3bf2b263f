//! Builds parameterized statements over per-collection JSONB tables.
//!
//! Each collection is a table `(id uuid, created timestamptz, modified timestamptz, doc jsonb)`.
//! Identifiers and field paths come from the validated catalog only; values are always parameters.

use crate::config::{is_valid_field_path, UniqueKey};
use crate::query::{Predicate, Query};
use crate::sql::PgBindValue;
use crate::store::Page;
use sha2::{Digest, Sha256};

/// Postgres limit on identifier length.
const MAX_IDENT_LEN: usize = 63;

pub const DOCUMENT_COLUMNS: &str = "\"id\", \"created\", \"modified\", \"doc\"";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

fn is_metadata(field: &str) -> bool {
    matches!(field, "id" | "created" | "modified")
}

/// `doc #>> '{a,b}'` for a dotted path.
fn doc_path(field: &str) -> String {
    debug_assert!(is_valid_field_path(field), "unchecked field path {}", field);
    format!("\"doc\" #>> '{{{}}}'", field.replace('.', ","))
}

/// Text expression for equality; matches the memory store's scalar text.
fn text_expr(field: &str) -> String {
    if is_metadata(field) {
        format!("{}::text", quoted(field))
    } else {
        doc_path(field)
    }
}

fn timestamp_expr(field: &str) -> String {
    match field {
        "created" | "modified" => quoted(field),
        _ => format!("({})::timestamptz", doc_path(field)),
    }
}

/// WHERE clause (with leading space) for a query, or empty when it matches everything.
fn where_clause(q: &mut QueryBuf, query: &Query) -> String {
    let mut parts = Vec::new();
    for p in &query.predicates {
        match p {
            Predicate::Eq { field, value } => {
                let n = q.push_param(PgBindValue::Text(value.clone()));
                parts.push(format!("{} = ${}", text_expr(field), n));
            }
            Predicate::Range { field, start, end } => {
                let expr = timestamp_expr(field);
                if let Some(s) = start {
                    let n = q.push_param(PgBindValue::Timestamp(*s));
                    parts.push(format!("{} >= ${}", expr, n));
                }
                if let Some(e) = end {
                    let n = q.push_param(PgBindValue::Timestamp(*e));
                    parts.push(format!("{} <= ${}", expr, n));
                }
            }
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema))
}

pub fn create_table(schema: &str, collection: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {} (
            "id" UUID PRIMARY KEY,
            "created" TIMESTAMPTZ NOT NULL,
            "modified" TIMESTAMPTZ NOT NULL,
            "doc" JSONB NOT NULL
        )"#,
        qualified_table(schema, collection)
    )
}

/// Index name for a unique key. Names over the identifier limit are cut and suffixed with a digest
/// of the full name, so distinct keys keep distinct indexes.
pub fn unique_index_name(collection: &str, key: &UniqueKey) -> String {
    let name = format!("{}_{}_uq", collection, key.fields.join("_").replace('.', "_"));
    if name.len() <= MAX_IDENT_LEN {
        return name;
    }
    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let suffix = &digest[..8];
    format!("{}_{}", &name[..MAX_IDENT_LEN - suffix.len() - 1], suffix)
}

pub fn create_unique_index(schema: &str, collection: &str, key: &UniqueKey) -> String {
    let exprs: Vec<String> = key.fields.iter().map(|f| format!("({})", doc_path(f))).collect();
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        quoted(&unique_index_name(collection, key)),
        qualified_table(schema, collection),
        exprs.join(", ")
    )
}

/// INSERT with store-assigned id; `created` and `modified` share the same instant.
pub fn insert(schema: &str, collection: &str, id: uuid::Uuid, doc_json: String) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_n = q.push_param(PgBindValue::Uuid(id));
    let doc_n = q.push_param(PgBindValue::Text(doc_json));
    q.sql = format!(
        "INSERT INTO {} (\"id\", \"created\", \"modified\", \"doc\") VALUES (${}, NOW(), NOW(), ${}::jsonb) RETURNING \"id\"",
        qualified_table(schema, collection),
        id_n,
        doc_n
    );
    q
}

pub fn select_by_id(schema: &str, collection: &str, id: uuid::Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(PgBindValue::Uuid(id));
    q.sql = format!(
        "SELECT {} FROM {} WHERE \"id\" = ${}",
        DOCUMENT_COLUMNS,
        qualified_table(schema, collection),
        n
    );
    q
}

/// SELECT matching documents ORDER BY created, id with explicit LIMIT/OFFSET.
pub fn select_many(schema: &str, collection: &str, query: &Query, page: Page) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, query);
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY \"created\", \"id\" LIMIT {} OFFSET {}",
        DOCUMENT_COLUMNS,
        qualified_table(schema, collection),
        where_sql,
        page.limit,
        page.offset
    );
    q
}

/// Shallow JSONB merge; `modified` strictly advances even when the clock has not.
pub fn update_merge(schema: &str, collection: &str, id: uuid::Uuid, patch_json: String) -> QueryBuf {
    let mut q = QueryBuf::new();
    let patch_n = q.push_param(PgBindValue::Text(patch_json));
    let id_n = q.push_param(PgBindValue::Uuid(id));
    q.sql = format!(
        "UPDATE {} SET \"doc\" = \"doc\" || ${}::jsonb, \"modified\" = GREATEST(NOW(), \"modified\" + INTERVAL '1 microsecond') WHERE \"id\" = ${} RETURNING {}",
        qualified_table(schema, collection),
        patch_n,
        id_n,
        DOCUMENT_COLUMNS
    );
    q
}

pub fn delete_by_id(schema: &str, collection: &str, id: uuid::Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(PgBindValue::Uuid(id));
    q.sql = format!("DELETE FROM {} WHERE \"id\" = ${}", qualified_table(schema, collection), n);
    q
}

pub fn delete_where(schema: &str, collection: &str, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, query);
    q.sql = format!("DELETE FROM {}{}", qualified_table(schema, collection), where_sql);
    q
}
