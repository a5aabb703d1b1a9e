//! Records moved through the pipeline: raw source items and finished articles.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feed or API a raw item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentSource {
    Apod,
    ApodRss,
    EsaHubble,
    EsaHubblePotw,
}

impl ContentSource {
    pub const ALL: [ContentSource; 4] = [
        ContentSource::Apod,
        ContentSource::ApodRss,
        ContentSource::EsaHubble,
        ContentSource::EsaHubblePotw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentSource::Apod => "apod",
            ContentSource::ApodRss => "apod-rss",
            ContentSource::EsaHubble => "esa-hubble",
            ContentSource::EsaHubblePotw => "esa-hubble-potw",
        }
    }

    pub fn is_apod(&self) -> bool {
        matches!(self, ContentSource::Apod | ContentSource::ApodRss)
    }

    /// Status a freshly fetched item starts in; the generator selects on it.
    pub fn default_status(&self) -> ContentStatus {
        if self.is_apod() {
            ContentStatus::Raw
        } else {
            ContentStatus::Pending
        }
    }

    pub fn article_kind(&self) -> ArticleKind {
        if self.is_apod() {
            ArticleKind::Discovery
        } else {
            ArticleKind::WeeklyPick
        }
    }

    /// Attribution appended to image alt texts.
    pub fn credit_label(&self) -> &'static str {
        if self.is_apod() {
            "APOD / NASA"
        } else {
            "ESA / Hubble"
        }
    }
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown content source: {}", s))
    }
}

/// Work-queue state of a raw item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Raw,
    Pending,
    Processed,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Raw => "raw",
            ContentStatus::Pending => "pending",
            ContentStatus::Processed => "processed",
            ContentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media rendition advertised by a feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaVariant {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: Option<String>,
}

impl MediaVariant {
    pub fn area(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }
}

/// Common accessors over the per-source payloads.
pub trait SourceRecord {
    /// Free text the article is written from.
    fn body_text(&self) -> &str;
    fn link(&self) -> Option<&str>;
    fn image_url(&self) -> Option<&str>;
    fn is_image(&self) -> bool;
}

/// NASA APOD payload (API or RSS mirror).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApodRawItem {
    pub explanation: String,
    pub url: Option<String>,
    pub hdurl: Option<String>,
    /// Best still image: `hdurl`, else `url` for images, else the video thumbnail.
    pub image_url: Option<String>,
    pub media_type: String,
    pub copyright: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl SourceRecord for ApodRawItem {
    fn body_text(&self) -> &str {
        &self.explanation
    }

    fn link(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn is_image(&self) -> bool {
        self.media_type == "image" && self.image_url.is_some()
    }
}

/// ESA Hubble RSS payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubbleRawItem {
    pub description: String,
    pub excerpt: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    /// Renditions other than the selected main image.
    #[serde(default)]
    pub image_variants: Vec<MediaVariant>,
    pub credit: Option<String>,
    pub copyright: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SourceRecord for HubbleRawItem {
    fn body_text(&self) -> &str {
        if self.description.is_empty() {
            &self.excerpt
        } else {
            &self.description
        }
    }

    fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn is_image(&self) -> bool {
        self.image_url.is_some()
    }
}

/// Source-specific part of a raw item, converted once at the fetcher boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum SourceItem {
    Apod(ApodRawItem),
    Hubble(HubbleRawItem),
}

impl SourceRecord for SourceItem {
    fn body_text(&self) -> &str {
        match self {
            SourceItem::Apod(item) => item.body_text(),
            SourceItem::Hubble(item) => item.body_text(),
        }
    }

    fn link(&self) -> Option<&str> {
        match self {
            SourceItem::Apod(item) => item.link(),
            SourceItem::Hubble(item) => item.link(),
        }
    }

    fn image_url(&self) -> Option<&str> {
        match self {
            SourceItem::Apod(item) => item.image_url(),
            SourceItem::Hubble(item) => item.image_url(),
        }
    }

    fn is_image(&self) -> bool {
        match self {
            SourceItem::Apod(item) => item.is_image(),
            SourceItem::Hubble(item) => item.is_image(),
        }
    }
}

/// A fetched item awaiting rewriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContentItem {
    pub content_id: String,
    pub source: ContentSource,
    /// Publication date of the subject, not ingestion time.
    pub date: NaiveDate,
    pub guid: Option<String>,
    pub title: String,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub details: SourceItem,
}

impl RawContentItem {
    pub fn new(
        source: ContentSource,
        date: NaiveDate,
        title: impl Into<String>,
        guid: Option<String>,
        details: SourceItem,
    ) -> Self {
        let now = Utc::now();
        Self {
            content_id: format!("{}-{}-{}", source, date, Uuid::new_v4()),
            source,
            date,
            guid: guid.filter(|g| !g.trim().is_empty()),
            title: title.into(),
            status: source.default_status(),
            created_at: now,
            updated_at: now,
            details,
        }
    }

    pub fn body_text(&self) -> &str {
        self.details.body_text()
    }

    pub fn source_url(&self) -> Option<&str> {
        self.details.link()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.details.image_url()
    }

    pub fn is_image(&self) -> bool {
        self.details.is_image()
    }
}

/// Article family; fixes category and structural minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticleKind {
    Discovery,
    WeeklyPick,
}

impl ArticleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleKind::Discovery => "discovery",
            ArticleKind::WeeklyPick => "weekly-pick",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ArticleKind::Discovery => "objav-dna",
            ArticleKind::WeeklyPick => "tyzdenny-vyber",
        }
    }

    pub fn section_count(&self) -> usize {
        match self {
            ArticleKind::Discovery => 5,
            ArticleKind::WeeklyPick => 4,
        }
    }

    pub fn min_section_chars(&self) -> usize {
        match self {
            ArticleKind::Discovery => 400,
            ArticleKind::WeeklyPick => 300,
        }
    }

    /// Minimum for perex plus all section bodies.
    pub fn min_total_chars(&self) -> usize {
        match self {
            ArticleKind::Discovery => 2000,
            ArticleKind::WeeklyPick => 1500,
        }
    }

    /// Perex length requested in the prompt; validation only enforces the global floor.
    pub fn perex_prompt_chars(&self) -> usize {
        match self {
            ArticleKind::Discovery => 200,
            ArticleKind::WeeklyPick => 150,
        }
    }

    pub fn faq_answer_prompt_chars(&self) -> usize {
        match self {
            ArticleKind::Discovery => 150,
            ArticleKind::WeeklyPick => 100,
        }
    }

    /// Slovak label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            ArticleKind::Discovery => "Objav dňa",
            ArticleKind::WeeklyPick => "Týždenný výber",
        }
    }
}

impl fmt::Display for ArticleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery" => Ok(ArticleKind::Discovery),
            "weekly-pick" => Ok(ArticleKind::WeeklyPick),
            other => anyhow::bail!("unknown article type: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Published,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// One stored crop of the article image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleImage {
    pub url: String,
    pub s3_key: String,
    pub alt: String,
    pub width: u32,
    pub height: u32,
}

/// A validated, publishable Slovak article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub article_id: String,
    pub slug: String,
    pub title: String,
    pub meta_title: String,
    pub meta_description: String,
    pub perex: String,
    pub content: Vec<Section>,
    pub faq: Vec<FaqEntry>,
    pub keywords: Vec<String>,
    pub estimated_reading_time: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: ArticleKind,
    pub status: ArticleStatus,
    pub source: ContentSource,
    pub source_url: Option<String>,
    pub original_date: NaiveDate,
    pub raw_content_id: String,
    pub author: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub images: BTreeMap<String, ArticleImage>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_round_trip() {
        for source in ContentSource::ALL {
            assert_eq!(source.as_str().parse::<ContentSource>().unwrap(), source);
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
        }
        assert!("rss".parse::<ContentSource>().is_err());
    }

    #[test]
    fn sources_start_in_their_queue_status() {
        assert_eq!(ContentSource::Apod.default_status(), ContentStatus::Raw);
        assert_eq!(ContentSource::ApodRss.default_status(), ContentStatus::Raw);
        assert_eq!(ContentSource::EsaHubble.default_status(), ContentStatus::Pending);
        assert_eq!(ContentSource::EsaHubblePotw.article_kind(), ArticleKind::WeeklyPick);
    }

    #[test]
    fn content_id_embeds_source_and_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        let item = RawContentItem::new(
            ContentSource::EsaHubblePotw,
            date,
            "Spiral",
            Some("  ".to_string()),
            SourceItem::Hubble(HubbleRawItem {
                description: String::new(),
                excerpt: "short".into(),
                link: None,
                image_url: None,
                image_variants: Vec::new(),
                credit: None,
                copyright: None,
                keywords: Vec::new(),
            }),
        );
        assert!(item.content_id.starts_with("esa-hubble-potw-2025-01-07-"));
        assert_eq!(item.guid, None);
        assert_eq!(item.status, ContentStatus::Pending);
        assert_eq!(item.body_text(), "short");
    }

    #[test]
    fn article_kind_serialises_as_type() {
        let value = serde_json::to_value(ArticleKind::WeeklyPick).unwrap();
        assert_eq!(value, "weekly-pick");
    }
}
