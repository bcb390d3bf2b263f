//! Values bound to document-store statements.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A value that can be bound to a PostgreSQL query.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Text(String),
    Uuid(uuid::Uuid),
    Timestamp(DateTime<Utc>),
}

/// Bind every parameter in order, each with its native Postgres type.
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [PgBindValue],
) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = match p {
            PgBindValue::Text(s) => query.bind(s.as_str()),
            PgBindValue::Uuid(u) => query.bind(*u),
            PgBindValue::Timestamp(t) => query.bind(*t),
        };
    }
    query
}
