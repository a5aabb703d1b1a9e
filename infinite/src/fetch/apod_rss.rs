//! APOD RSS mirror. The feed only carries a teaser, so each entry's APOD page
//! is fetched to recover the full explanation and the main image link.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use feed_rs::model::Entry;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::normalize::{clean_url, html_to_text, resolve_url};
use super::{fetch_text, ingest, FetchReport};
use crate::model::{ApodRawItem, ContentSource, RawContentItem, SourceItem};
use crate::store::RawContentStore;

pub const APOD_BASE_URL: &str = "https://apod.nasa.gov/apod/";
const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// What an APOD HTML page contributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApodPage {
    pub explanation: Option<String>,
    pub image_url: Option<String>,
}

pub struct ApodRssFetcher {
    client: Client,
    feed_url: String,
}

impl ApodRssFetcher {
    pub fn new(client: Client, feed_url: impl Into<String>) -> Self {
        Self {
            client,
            feed_url: feed_url.into(),
        }
    }

    pub async fn run(&self, store: &RawContentStore) -> Result<FetchReport> {
        info!(url = %self.feed_url, "fetching APOD RSS");
        let body = fetch_text(&self.client, &self.feed_url).await?;
        let feed = feed_rs::parser::parse(body.as_bytes()).context("failed to parse APOD feed")?;
        info!(entries = feed.entries.len(), "APOD RSS parsed");

        let mut report = FetchReport::new(ContentSource::ApodRss);
        for entry in &feed.entries {
            let title = entry_title(entry);
            match self.build_item(entry).await {
                Ok(item) => ingest(store, &mut report, &item).await,
                Err(e) => report.record_error(title, &e),
            }
        }
        report.log_summary();
        Ok(report)
    }

    async fn build_item(&self, entry: &Entry) -> Result<RawContentItem> {
        let title = entry_title(entry);
        if title.is_empty() {
            anyhow::bail!("entry without title");
        }
        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .and_then(|href| clean_url(Some(&href)))
            .context("entry without usable link")?;
        let date: NaiveDate = entry
            .published
            .or(entry.updated)
            .unwrap_or_else(Utc::now)
            .date_naive();

        let teaser = entry
            .summary
            .as_ref()
            .map(|s| html_to_text(&s.content))
            .unwrap_or_default();

        let page = match fetch_text(&self.client, &link).await {
            Ok(html) => parse_apod_page(&html),
            Err(e) if !teaser.is_empty() => {
                warn!(url = %link, error = %e, "APOD page unavailable, using feed teaser");
                ApodPage::default()
            }
            Err(e) => return Err(e.context("APOD page unavailable and feed has no teaser")),
        };

        let explanation = page.explanation.unwrap_or(teaser);
        let enclosure = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .filter(|c| {
                c.content_type
                    .as_ref()
                    .map_or(true, |t| t.essence_str().starts_with("image/"))
            })
            .find_map(|c| c.url.as_ref().map(|u| u.to_string()));
        let image_url = page.image_url.or_else(|| clean_url(enclosure.as_deref()));
        debug!(%title, chars = explanation.chars().count(), image = ?image_url, "APOD page parsed");

        let details = ApodRawItem {
            explanation,
            url: Some(link),
            hdurl: None,
            media_type: if image_url.is_some() { "image" } else { "other" }.to_string(),
            image_url,
            copyright: None,
            thumbnail_url: None,
        };

        Ok(RawContentItem::new(
            ContentSource::ApodRss,
            date,
            title,
            Some(entry.id.clone()),
            SourceItem::Apod(details),
        ))
    }
}

fn entry_title(entry: &Entry) -> String {
    entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default()
}

/// Extract the "Explanation:" paragraph and the first linked image.
pub fn parse_apod_page(html: &str) -> ApodPage {
    let document = Html::parse_document(html);
    ApodPage {
        explanation: explanation_text(&document),
        image_url: main_image_link(&document),
    }
}

fn explanation_text(document: &Html) -> Option<String> {
    let bold = Selector::parse("b").ok()?;
    let label = document
        .select(&bold)
        .find(|b| b.text().collect::<String>().trim().starts_with("Explanation"))?;
    let container = label.parent().and_then(ElementRef::wrap)?;

    let text = container.text().collect::<Vec<_>>().join(" ");
    let after = text.split_once("Explanation:").map(|(_, rest)| rest)?;
    let collapsed = after.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed).filter(|t| !t.is_empty())
}

fn main_image_link(document: &Html) -> Option<String> {
    let anchors = Selector::parse("a[href]").ok()?;
    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| {
            let lower = href.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
        .and_then(|href| resolve_url(APOD_BASE_URL, href))
}
