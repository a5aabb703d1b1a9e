use anyhow::Result;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::info;

use super::{get_document, put_document, query_with_fallback, Document, Lookup};
use crate::model::{ContentSource, ContentStatus, RawContentItem};

pub const IDX_STATUS: &str = "idx_raw_content_status";
pub const IDX_SOURCE_DATE: &str = "idx_raw_content_source_date";
pub const IDX_GUID: &str = "idx_raw_content_guid";

impl Document for RawContentItem {
    const TABLE: &'static str = "raw_content";
    const KEY: &'static str = "content_id";
    const COLUMNS: &'static [&'static str] = &["source", "date", "guid", "status", "title"];

    fn key(&self) -> &str {
        &self.content_id
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "content_id" => Some(self.content_id.clone()),
            "source" => Some(self.source.as_str().to_string()),
            "date" => Some(self.date.to_string()),
            "guid" => self.guid.clone(),
            "status" => Some(self.status.as_str().to_string()),
            "title" => Some(self.title.clone()),
            _ => None,
        }
    }
}

/// Fetched-but-not-yet-rewritten items.
#[derive(Clone)]
pub struct RawContentStore {
    pool: SqlitePool,
}

impl RawContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, item: &RawContentItem) -> Result<()> {
        put_document(&self.pool, item).await?;
        info!(content_id = %item.content_id, source = %item.source, date = %item.date, "raw item stored");
        Ok(())
    }

    /// Overwrite an existing item (refresh from source).
    pub async fn put(&self, item: &RawContentItem) -> Result<()> {
        put_document(&self.pool, item).await
    }

    pub async fn get(&self, content_id: &str) -> Result<Option<RawContentItem>> {
        get_document(&self.pool, content_id).await
    }

    pub async fn find_by_guid(&self, guid: &str) -> Result<Vec<RawContentItem>> {
        let lookup = Lookup::on(IDX_GUID).key("guid", guid);
        query_with_fallback(&self.pool, &lookup).await
    }

    pub async fn find_by_source_date(
        &self,
        source: ContentSource,
        date: NaiveDate,
        title: Option<&str>,
    ) -> Result<Vec<RawContentItem>> {
        let lookup = Lookup::on(IDX_SOURCE_DATE)
            .key("source", source.as_str())
            .key("date", date.to_string())
            .filter_opt("title", title);
        query_with_fallback(&self.pool, &lookup).await
    }

    /// Oldest first, so the work queue drains in publication order.
    pub async fn find_by_status(
        &self,
        status: ContentStatus,
        source: Option<ContentSource>,
    ) -> Result<Vec<RawContentItem>> {
        let lookup = Lookup::on(IDX_STATUS)
            .key("status", status.as_str())
            .filter_opt("source", source.map(|s| s.as_str()));
        let mut items: Vec<RawContentItem> = query_with_fallback(&self.pool, &lookup).await?;
        items.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(items)
    }

    /// Returns false when the item does not exist.
    pub async fn update_status(&self, content_id: &str, status: ContentStatus) -> Result<bool> {
        let Some(mut item) = self.get(content_id).await? else {
            return Ok(false);
        };
        item.status = status;
        item.updated_at = Utc::now();
        put_document(&self.pool, &item).await?;
        info!(content_id, status = %status, "raw item status updated");
        Ok(true)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
