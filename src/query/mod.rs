//! Query builder: typed filter options translated into store predicates, omitting unset filters.

use crate::config::ResolvedResource;
use crate::error::AppError;
use crate::store::{Document, Page};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Provenance fields every record may carry.
pub const SOURCE_FIELD: &str = "meta.source";
pub const SOURCE_ID_FIELD: &str = "meta.sourceId";

/// How a date range with only one bound is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DateRangeMode {
    /// A missing bound puts no predicate on that side.
    #[default]
    OpenEnded,
    /// A missing start is the Unix epoch and a missing end is the build time.
    Clamped,
}

impl FromStr for DateRangeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" | "open-ended" | "open_ended" => Ok(DateRangeMode::OpenEnded),
            "clamped" => Ok(DateRangeMode::Clamped),
            other => Err(format!("expected open or clamped, got {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Scalar at `field`, compared as text.
    Eq { field: String, value: String },
    /// Timestamp at `field` within inclusive bounds.
    Range {
        field: String,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Eq { field, .. } | Predicate::Range { field, .. } => field,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::Eq { field, value } => doc.scalar_text(field).as_deref() == Some(value.as_str()),
            Predicate::Range { field, start, end } => {
                let Some(ts) = doc.timestamp(field) else {
                    return false;
                };
                start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e)
            }
        }
    }
}

/// Conjunction of predicates. Empty matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
}

impl Query {
    pub fn all() -> Self {
        Query::default()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates.iter().all(|p| p.matches(doc))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

pub struct QueryBuilder {
    mode: DateRangeMode,
    now: DateTime<Utc>,
    predicates: Vec<Predicate>,
}

impl QueryBuilder {
    pub fn new(mode: DateRangeMode) -> Self {
        QueryBuilder {
            mode,
            now: Utc::now(),
            predicates: Vec::new(),
        }
    }

    /// Fix the instant used as the clamped upper bound.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn eq(mut self, field: &str, value: Option<&str>) -> Self {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            self.predicates.push(Predicate::Eq {
                field: field.to_string(),
                value: v.to_string(),
            });
        }
        self
    }

    pub fn date_range(mut self, field: &str, range: &DateRange) -> Self {
        if range.is_empty() {
            return self;
        }
        let (start, end) = match self.mode {
            DateRangeMode::OpenEnded => (range.start, range.end),
            DateRangeMode::Clamped => (
                Some(range.start.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)),
                Some(range.end.unwrap_or(self.now)),
            ),
        };
        self.predicates.push(Predicate::Range {
            field: field.to_string(),
            start,
            end,
        });
        self
    }

    pub fn build(self) -> Query {
        Query {
            predicates: self.predicates,
        }
    }
}

/// Named optional filters accepted by every list endpoint, plus the resource's own.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterOptions {
    pub id: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub created: DateRange,
    pub modified: DateRange,
    pub fields: BTreeMap<String, String>,
    pub date_ranges: BTreeMap<String, DateRange>,
}

impl FilterOptions {
    pub fn to_query(&self, builder: QueryBuilder) -> Query {
        let mut b = builder
            .eq("id", self.id.as_deref())
            .eq(SOURCE_FIELD, self.source.as_deref())
            .eq(SOURCE_ID_FIELD, self.source_id.as_deref())
            .date_range("created", &self.created)
            .date_range("modified", &self.modified);
        for (field, value) in &self.fields {
            b = b.eq(field, Some(value));
        }
        for (field, range) in &self.date_ranges {
            b = b.date_range(field, range);
        }
        b.build()
    }
}

/// Parsed query string of a list request.
#[derive(Clone, Debug, PartialEq)]
pub struct ListParams {
    pub filters: FilterOptions,
    pub page: Page,
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` meaning midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_bound(key: &str, value: &str) -> Result<DateTime<Utc>, AppError> {
    parse_timestamp(value)
        .ok_or_else(|| AppError::Validation(format!("{} must be an RFC 3339 timestamp or YYYY-MM-DD", key)))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, AppError> {
    value
        .parse()
        .map_err(|_| AppError::Validation(format!("{} must be a non-negative integer", key)))
}

/// Parse list query parameters for `resource`. Unknown keys and malformed values are rejected.
pub fn parse_list_params(
    resource: &ResolvedResource,
    params: &HashMap<String, String>,
) -> Result<ListParams, AppError> {
    let mut filters = FilterOptions::default();
    let mut limit = None;
    let mut offset = None;

    for (key, raw) in params {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "limit" => limit = Some(parse_u32(key, value)?),
            "offset" => offset = Some(parse_u32(key, value)?),
            "id" => {
                let id = uuid::Uuid::parse_str(value).map_err(|_| AppError::Validation("id must be a UUID".into()))?;
                filters.id = Some(id.to_string());
            }
            "source" => filters.source = Some(value.to_string()),
            "sourceId" => filters.source_id = Some(value.to_string()),
            "created_start" => filters.created.start = Some(parse_bound(key, value)?),
            "created_end" => filters.created.end = Some(parse_bound(key, value)?),
            "modified_start" => filters.modified.start = Some(parse_bound(key, value)?),
            "modified_end" => filters.modified.end = Some(parse_bound(key, value)?),
            _ => {
                if resource.eq_filters.iter().any(|f| f == key) {
                    filters.fields.insert(key.clone(), value.to_string());
                    continue;
                }
                let range_key = key
                    .strip_suffix("_start")
                    .map(|f| (f, true))
                    .or_else(|| key.strip_suffix("_end").map(|f| (f, false)));
                match range_key {
                    Some((field, is_start)) if resource.date_filters.iter().any(|f| f == field) => {
                        let bound = parse_bound(key, value)?;
                        let range = filters.date_ranges.entry(field.to_string()).or_default();
                        if is_start {
                            range.start = Some(bound);
                        } else {
                            range.end = Some(bound);
                        }
                    }
                    _ => {
                        return Err(AppError::Validation(format!(
                            "unknown filter '{}' for {}",
                            key, resource.path_segment
                        )))
                    }
                }
            }
        }
    }

    Ok(ListParams {
        filters,
        page: Page::new(limit, offset),
    })
}
