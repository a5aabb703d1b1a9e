//! NASA APOD JSON API.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::normalize::clean_url;
use super::{ingest, FetchReport};
use crate::model::{ApodRawItem, ContentSource, RawContentItem, SourceItem};
use crate::store::RawContentStore;

/// Response body of `GET /planetary/apod`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApodResponse {
    pub date: Option<String>,
    pub title: Option<String>,
    pub explanation: Option<String>,
    pub url: Option<String>,
    pub hdurl: Option<String>,
    pub media_type: Option<String>,
    pub copyright: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Authenticated client for the APOD endpoint.
#[derive(Clone)]
pub struct ApodClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl ApodClient {
    pub fn new(client: Client, api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Fetch the entry for `date`, or today's when `None`.
    pub async fn fetch(&self, date: Option<NaiveDate>) -> Result<ApodResponse> {
        let mut query = vec![
            ("api_key", self.api_key.clone()),
            ("thumbs", "true".to_string()),
        ];
        if let Some(date) = date {
            query.push(("date", date.to_string()));
        }

        let response = self
            .client
            .get(&self.api_url)
            .query(&query)
            .send()
            .await
            .context("APOD request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("APOD API error {}: {}", status, body);
        }

        response
            .json::<ApodResponse>()
            .await
            .context("failed to parse APOD response")
    }

    /// Fetch and convert in one step.
    pub async fn fetch_item(&self, date: Option<NaiveDate>) -> Result<RawContentItem> {
        let response = self.fetch(date).await?;
        to_raw_item(response)
    }

    /// One fetcher run: fetch, de-duplicate, insert.
    pub async fn run(&self, store: &RawContentStore, date: Option<NaiveDate>) -> Result<FetchReport> {
        info!(date = ?date, "fetching NASA APOD");
        let response = self.fetch(date).await?;

        let mut report = FetchReport::new(ContentSource::Apod);
        let title = response.title.clone().unwrap_or_default();
        match to_raw_item(response) {
            Ok(item) => ingest(store, &mut report, &item).await,
            Err(e) => report.record_error(title, &e),
        }
        report.log_summary();
        Ok(report)
    }
}

/// Validate required fields and drop malformed media URLs.
pub fn to_raw_item(response: ApodResponse) -> Result<RawContentItem> {
    let date = required(response.date, "date")?;
    let title = required(response.title, "title")?;
    let explanation = required(response.explanation, "explanation")?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .with_context(|| format!("invalid APOD date: {}", date))?;

    let url = checked_url(response.url, "url");
    let hdurl = checked_url(response.hdurl, "hdurl");
    let thumbnail_url = checked_url(response.thumbnail_url, "thumbnail_url");
    let media_type = response
        .media_type
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "image".to_string());

    let image_url = if media_type == "image" {
        hdurl.clone().or_else(|| url.clone())
    } else {
        thumbnail_url.clone()
    };

    let details = ApodRawItem {
        explanation,
        url,
        hdurl,
        image_url,
        media_type,
        copyright: response
            .copyright
            .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|c| !c.is_empty()),
        thumbnail_url,
    };

    Ok(RawContentItem::new(
        ContentSource::Apod,
        date,
        title,
        None,
        SourceItem::Apod(details),
    ))
}

/// Carry fresh source data into an existing item, keeping its identity.
pub fn refresh(existing: &RawContentItem, fresh: RawContentItem) -> RawContentItem {
    RawContentItem {
        content_id: existing.content_id.clone(),
        source: existing.source,
        guid: existing.guid.clone().or(fresh.guid),
        created_at: existing.created_at,
        status: existing.status,
        updated_at: Utc::now(),
        date: fresh.date,
        title: fresh.title,
        details: fresh.details,
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .with_context(|| format!("invalid APOD data: missing {}", field))
}

fn checked_url(value: Option<String>, field: &str) -> Option<String> {
    let raw = value.filter(|v| !v.trim().is_empty())?;
    let cleaned = clean_url(Some(&raw));
    if cleaned.is_none() {
        warn!(field, url = %raw, "discarding invalid APOD media URL");
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentStatus;

    fn response() -> ApodResponse {
        ApodResponse {
            date: Some("2025-01-07".into()),
            title: Some("M87 Jet".into()),
            explanation: Some("A jet from the black hole.".into()),
            url: Some("https://apod.nasa.gov/apod/image/2501/m87_1024.jpg".into()),
            hdurl: Some("https://apod.nasa.gov/apod/image/2501/m87.jpg".into()),
            media_type: Some("image".into()),
            copyright: Some("\nJane\n Doe ".into()),
            thumbnail_url: None,
        }
    }

    #[test]
    fn image_entry_prefers_hd_url() {
        let item = to_raw_item(response()).unwrap();
        assert_eq!(item.source, ContentSource::Apod);
        assert_eq!(item.status, ContentStatus::Raw);
        assert_eq!(item.image_url(), Some("https://apod.nasa.gov/apod/image/2501/m87.jpg"));
        match &item.details {
            SourceItem::Apod(apod) => assert_eq!(apod.copyright.as_deref(), Some("Jane Doe")),
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn invalid_urls_are_nulled_not_fatal() {
        let mut r = response();
        r.hdurl = Some("not a url".into());
        r.url = Some("also bad".into());
        let item = to_raw_item(r).unwrap();
        assert_eq!(item.image_url(), None);
        assert!(!item.is_image());
    }

    #[test]
    fn video_entry_uses_thumbnail() {
        let mut r = response();
        r.media_type = Some("video".into());
        r.hdurl = None;
        r.url = Some("https://www.youtube.com/embed/xyz".into());
        r.thumbnail_url = Some("https://img.youtube.com/vi/xyz/0.jpg".into());
        let item = to_raw_item(r).unwrap();
        assert_eq!(item.image_url(), Some("https://img.youtube.com/vi/xyz/0.jpg"));
        assert!(!item.is_image());
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let mut r = response();
        r.explanation = Some("   ".into());
        let err = to_raw_item(r).unwrap_err();
        assert!(err.to_string().contains("explanation"));
    }

    #[test]
    fn refresh_keeps_identity() {
        let old = to_raw_item(response()).unwrap();
        let mut r = response();
        r.title = Some("M87 Jet (revised)".into());
        let fresh = to_raw_item(r).unwrap();
        let merged = refresh(&old, fresh);
        assert_eq!(merged.content_id, old.content_id);
        assert_eq!(merged.title, "M87 Jet (revised)");
        assert_eq!(merged.created_at, old.created_at);
    }
}
