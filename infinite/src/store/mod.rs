//! Document tables over SQLite.
//!
//! Every record is stored whole as JSON in a `doc` column, next to the
//! columns its secondary indexes cover. Reads go through
//! [`query_with_fallback`]: the named index is forced with `INDEXED BY`, and
//! if that query fails (missing index, no usable plan) the same conditions
//! are evaluated in Rust over a full scan.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

pub mod articles;
pub mod raw;

pub use articles::{ArticleStore, HomePage};
pub use raw::RawContentStore;

/// A record persisted as a JSON document with extracted key columns.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const TABLE: &'static str;
    /// Primary key column.
    const KEY: &'static str;
    /// Indexed columns stored beside the document (excluding `KEY`).
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> &str;

    /// Value of a named field as compared by lookups. Works for any field
    /// name a filter may use, not only table columns.
    fn field(&self, name: &str) -> Option<String>;
}

/// Equality test on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: &'static str,
    pub value: String,
}

impl Condition {
    pub fn eq(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    fn matches<T: Document>(&self, doc: &T) -> bool {
        doc.field(self.field).as_deref() == Some(self.value.as_str())
    }
}

/// Index descriptor plus the conditions it answers.
///
/// `keys` are pushed into SQL on the indexed path; `filters` are always
/// applied in Rust. On the scan path both are applied in Rust, which keeps
/// the two paths equivalent.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub index: &'static str,
    pub keys: Vec<Condition>,
    pub filters: Vec<Condition>,
}

impl Lookup {
    pub fn on(index: &'static str) -> Self {
        Self {
            index,
            keys: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn key(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.keys.push(Condition::eq(field, value));
        self
    }

    pub fn filter(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.filters.push(Condition::eq(field, value));
        self
    }

    pub fn filter_opt(self, field: &'static str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.filter(field, v),
            None => self,
        }
    }

    pub fn matches<T: Document>(&self, doc: &T) -> bool {
        self.keys.iter().chain(self.filters.iter()).all(|c| c.matches(doc))
    }

    fn matches_filters<T: Document>(&self, doc: &T) -> bool {
        self.filters.iter().all(|c| c.matches(doc))
    }
}

/// Run `lookup` through its index, falling back to a full scan on failure.
pub async fn query_with_fallback<T: Document>(pool: &SqlitePool, lookup: &Lookup) -> Result<Vec<T>> {
    match query_indexed::<T>(pool, lookup).await {
        Ok(docs) => Ok(docs),
        Err(e) => {
            warn!(
                table = T::TABLE,
                index = lookup.index,
                error = %e,
                "indexed query unavailable, falling back to table scan"
            );
            scan::<T>(pool, lookup).await
        }
    }
}

/// Indexed path only. Errors when the index cannot be used.
pub async fn query_indexed<T: Document>(pool: &SqlitePool, lookup: &Lookup) -> Result<Vec<T>> {
    let mut sql = format!("SELECT doc FROM {} INDEXED BY {}", T::TABLE, lookup.index);
    for (i, cond) in lookup.keys.iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(cond.field);
        sql.push_str(" = ?");
    }

    let mut query = sqlx::query(&sql);
    for cond in &lookup.keys {
        query = query.bind(cond.value.as_str());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .with_context(|| format!("indexed query on {} via {}", T::TABLE, lookup.index))?;

    let docs = decode_rows::<T>(rows)
        .into_iter()
        .filter(|doc| lookup.matches_filters(doc))
        .collect();
    Ok(docs)
}

/// Scan path only: load every document and apply the lookup in Rust.
pub async fn scan<T: Document>(pool: &SqlitePool, lookup: &Lookup) -> Result<Vec<T>> {
    let rows = sqlx::query(&format!("SELECT doc FROM {}", T::TABLE))
        .fetch_all(pool)
        .await
        .with_context(|| format!("scan of {}", T::TABLE))?;

    let docs = decode_rows::<T>(rows)
        .into_iter()
        .filter(|doc| lookup.matches(doc))
        .collect();
    Ok(docs)
}

fn decode_rows<T: Document>(rows: Vec<sqlx::sqlite::SqliteRow>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| {
            let raw: String = match row.try_get("doc") {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(table = T::TABLE, error = %e, "row without readable doc column");
                    return None;
                }
            };
            match serde_json::from_str::<T>(&raw) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(table = T::TABLE, error = %e, "skipping undecodable document");
                    None
                }
            }
        })
        .collect()
}

/// Insert or replace a whole document (per-row atomic).
pub async fn put_document<T: Document>(pool: &SqlitePool, doc: &T) -> Result<()> {
    let mut columns = vec![T::KEY];
    columns.extend_from_slice(T::COLUMNS);
    columns.push("doc");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        T::TABLE,
        columns.join(", "),
        placeholders
    );

    let body = serde_json::to_string(doc).context("failed to serialise document")?;
    let mut query = sqlx::query(&sql).bind(doc.key().to_string());
    for column in T::COLUMNS {
        query = query.bind(doc.field(column));
    }
    query = query.bind(body);

    query
        .execute(pool)
        .await
        .with_context(|| format!("failed to write {} {}", T::TABLE, doc.key()))?;
    debug!(table = T::TABLE, key = doc.key(), "document stored");
    Ok(())
}

/// Primary-key read.
pub async fn get_document<T: Document>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    let sql = format!("SELECT doc FROM {} WHERE {} = ?", T::TABLE, T::KEY);
    let row = sqlx::query(&sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to read {} {}", T::TABLE, key))?;

    match row {
        Some(row) => {
            let raw: String = row.try_get("doc")?;
            let doc = serde_json::from_str(&raw)
                .with_context(|| format!("corrupt document {} {}", T::TABLE, key))?;
            Ok(Some(doc))
        }
        None => Ok(None),
    }
}

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of results, 1-based.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl<T> Paginated<T> {
    pub fn from_sorted(items: Vec<T>, page: Option<usize>, limit: Option<usize>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let total = items.len();
        let start = (page - 1).saturating_mul(limit);
        let items: Vec<T> = items.into_iter().skip(start).take(limit).collect();
        let has_more = start + items.len() < total;
        Self {
            items,
            total,
            page,
            limit,
            has_more,
        }
    }
}
