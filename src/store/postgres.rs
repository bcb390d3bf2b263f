//! Postgres-backed document store: one JSONB table per collection in a configurable schema.

use crate::config::CollectionSpec;
use crate::error::StoreError;
use crate::query::Query;
use crate::sql::{self, bind_all};
use crate::store::{Document, DocumentStore, Page};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, Executor, PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

pub struct PgDocumentStore {
    pool: PgPool,
    schema: String,
    /// Unique index name -> unique key name, for reporting conflicts.
    index_keys: RwLock<HashMap<String, String>>,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgDocumentStore {
            pool,
            schema: schema.into(),
            index_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Create the database if needed, open a pool pinned to UTC, and create the schema.
    pub async fn connect(database_url: &str, max_connections: u32, schema: &str) -> Result<Self, StoreError> {
        ensure_database_exists(database_url).await?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET TIME ZONE 'UTC'").await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        sqlx::query(&sql::create_schema(schema)).execute(&pool).await?;
        tracing::info!(schema, "connected to postgres document store");
        Ok(Self::new(pool, schema))
    }

    fn key_for_index(&self, index: &str) -> Option<String> {
        self.index_keys.read().ok()?.get(index).cloned()
    }

    fn map_err(&self, collection: &str, e: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let key = db
                    .constraint()
                    .and_then(|c| self.key_for_index(c))
                    .unwrap_or_else(|| "unique key".to_string());
                return StoreError::Duplicate {
                    collection: collection.to_string(),
                    key,
                };
            }
            if db.code().as_deref() == Some("42P01") {
                return StoreError::UnknownCollection(collection.to_string());
            }
        }
        StoreError::Db(e)
    }
}

fn to_json(collection: &str, body: &Map<String, Value>) -> Result<String, StoreError> {
    serde_json::to_string(body).map_err(|e| StoreError::Corrupt {
        collection: collection.to_string(),
        message: e.to_string(),
    })
}

fn row_to_document(collection: &str, row: &PgRow) -> Result<Document, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let created: DateTime<Utc> = row.try_get("created")?;
    let modified: DateTime<Utc> = row.try_get("modified")?;
    let doc: Value = row.try_get("doc")?;
    let Value::Object(body) = doc else {
        return Err(StoreError::Corrupt {
            collection: collection.to_string(),
            message: format!("document {} is not an object", id),
        });
    };
    Ok(Document {
        id,
        created,
        modified,
        body,
    })
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        sqlx::query(&sql::create_table(&self.schema, &spec.name))
            .execute(&self.pool)
            .await?;
        for key in &spec.unique_keys {
            let ddl = sql::create_unique_index(&self.schema, &spec.name, key);
            tracing::debug!(sql = %ddl, "ensure unique index");
            sqlx::query(&ddl).execute(&self.pool).await?;
            if let Ok(mut keys) = self.index_keys.write() {
                keys.insert(sql::unique_index_name(&spec.name, key), key.name.clone());
            }
        }
        Ok(())
    }

    async fn insert_one(&self, collection: &str, body: Map<String, Value>) -> Result<Uuid, StoreError> {
        let q = sql::insert(&self.schema, collection, Uuid::new_v4(), to_json(collection, &body)?);
        tracing::debug!(sql = %q.sql, "insert");
        let row = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.map_err(collection, e))?;
        Ok(row.try_get("id")?)
    }

    async fn find_one(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let q = sql::select_by_id(&self.schema, collection, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.map_err(collection, e))?;
        row.map(|r| row_to_document(collection, &r)).transpose()
    }

    async fn find(&self, collection: &str, query: &Query, page: Page) -> Result<Vec<Document>, StoreError> {
        let q = sql::select_many(&self.schema, collection, query, page);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.map_err(collection, e))?;
        rows.iter().map(|r| row_to_document(collection, r)).collect()
    }

    async fn update_one(
        &self,
        collection: &str,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        let q = sql::update_merge(&self.schema, collection, id, to_json(collection, &patch)?);
        tracing::debug!(sql = %q.sql, "update");
        let row = bind_all(sqlx::query(&q.sql), &q.params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.map_err(collection, e))?;
        row.map(|r| row_to_document(collection, &r)).transpose()
    }

    async fn delete_one(&self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let q = sql::delete_by_id(&self.schema, collection, id);
        let result = bind_all(sqlx::query(&q.sql), &q.params)
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_err(collection, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<u64, StoreError> {
        let q = sql::delete_where(&self.schema, collection, query);
        tracing::debug!(sql = %q.sql, params = ?q.params, "delete");
        let result = bind_all(sqlx::query(&q.sql), &q.params)
            .execute(&self.pool)
            .await
            .map_err(|e| self.map_err(collection, e))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Db(sqlx::Error::Configuration("DATABASE_URL: no path".into())))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
