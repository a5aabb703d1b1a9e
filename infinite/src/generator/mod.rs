//! Turns raw source items into validated Slovak articles.
//!
//! Items are handled strictly one after another. A failure on one item marks
//! it `failed` and the loop moves on; only selecting the work can abort a run.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::images::{self, ImagePipeline};
use crate::llm::enrich::{clean_keywords, polish_title, seo_keywords, MIN_KEYWORDS};
use crate::llm::{LlmProvider, LlmRequest};
use crate::model::{Article, ArticleStatus, ContentSource, ContentStatus, RawContentItem};
use crate::store::{ArticleStore, RawContentStore};

pub mod parse;
pub mod prompt;
pub mod slug;
pub mod validate;

use parse::parse_generated;
use prompt::{system_prompt, user_prompt, SeoBrief};

pub const DEFAULT_AUTHOR: &str = "Infinite AI";
pub const DEFAULT_READING_TIME: &str = "5 minút";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("AI generation failed: {0:#}")]
    Llm(anyhow::Error),
    #[error("no JSON object found in AI response")]
    NoJson,
    #[error("AI response is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("AI response has an unexpected shape: {0}")]
    Malformed(String),
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("failed to persist article: {0:#}")]
    Storage(anyhow::Error),
}

impl GenerationError {
    pub fn issues(&self) -> &[String] {
        match self {
            GenerationError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

/// Which raw items a run should pick up.
#[derive(Debug, Clone)]
pub enum WorkSelection {
    /// Every item still in its source's initial status.
    Pending,
    /// One named item. With `bypass_status` it is regenerated whatever its status.
    Single {
        content_id: String,
        source: ContentSource,
        bypass_status: bool,
        brief: Option<SeoBrief>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ItemOutcome {
    Processed { article_id: String, slug: String },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        issues: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub content_id: String,
    pub source: ContentSource,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct GenerationReport {
    pub total: usize,
    pub processed: usize,
    pub errors: usize,
    pub results: Vec<ItemResult>,
}

impl GenerationReport {
    fn record(&mut self, item: &RawContentItem, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Processed { .. } => self.processed += 1,
            ItemOutcome::Failed { .. } => self.errors += 1,
        }
        self.results.push(ItemResult {
            content_id: item.content_id.clone(),
            source: item.source,
            outcome,
        });
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            max_tokens: 6000,
            temperature: 0.7,
        }
    }
}

pub struct ContentGenerator {
    raw: RawContentStore,
    articles: ArticleStore,
    llm: Arc<dyn LlmProvider>,
    images: Option<ImagePipeline>,
    settings: GeneratorSettings,
}

impl ContentGenerator {
    pub fn new(raw: RawContentStore, articles: ArticleStore, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            raw,
            articles,
            llm,
            images: None,
            settings: GeneratorSettings::default(),
        }
    }

    pub fn with_images(mut self, pipeline: ImagePipeline) -> Self {
        self.images = Some(pipeline);
        self
    }

    pub fn with_settings(mut self, settings: GeneratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn run(&self, selection: WorkSelection) -> Result<GenerationReport> {
        let work = self.select(selection).await?;
        let mut report = GenerationReport {
            total: work.len(),
            ..Default::default()
        };
        info!(items = work.len(), "generation run started");

        for (item, brief) in work {
            let outcome = match self.process_item(&item, brief.as_ref()).await {
                Ok(article) => {
                    self.set_status(&item, ContentStatus::Processed).await;
                    ItemOutcome::Processed {
                        article_id: article.article_id,
                        slug: article.slug,
                    }
                }
                Err(e) => {
                    warn!(content_id = %item.content_id, source = %item.source, error = %e, "generation failed");
                    self.set_status(&item, ContentStatus::Failed).await;
                    ItemOutcome::Failed {
                        error: e.to_string(),
                        issues: e.issues().to_vec(),
                    }
                }
            };
            report.record(&item, outcome);
        }

        info!(
            total = report.total,
            processed = report.processed,
            errors = report.errors,
            "generation run finished"
        );
        Ok(report)
    }

    async fn select(&self, selection: WorkSelection) -> Result<Vec<(RawContentItem, Option<SeoBrief>)>> {
        match selection {
            WorkSelection::Pending => {
                let mut work = Vec::new();
                for status in [ContentStatus::Raw, ContentStatus::Pending] {
                    let items = self.raw.find_by_status(status, None).await?;
                    work.extend(
                        items
                            .into_iter()
                            .filter(|item| item.source.default_status() == status)
                            .map(|item| (item, None)),
                    );
                }
                Ok(work)
            }
            WorkSelection::Single {
                content_id,
                source,
                bypass_status,
                brief,
            } => {
                let item = self
                    .raw
                    .get(&content_id)
                    .await?
                    .filter(|item| item.source == source)
                    .ok_or_else(|| anyhow::anyhow!("content {} ({}) not found", content_id, source))?;

                if !bypass_status && item.status != item.source.default_status() {
                    info!(content_id = %item.content_id, status = %item.status, "item already handled, skipping");
                    return Ok(Vec::new());
                }
                Ok(vec![(item, brief)])
            }
        }
    }

    async fn set_status(&self, item: &RawContentItem, status: ContentStatus) {
        match self.raw.update_status(&item.content_id, status).await {
            Ok(true) => {}
            Ok(false) => warn!(content_id = %item.content_id, "raw item vanished before status update"),
            Err(e) => error!(content_id = %item.content_id, %status, error = %e, "failed to update raw item status"),
        }
    }

    /// Generate, validate and persist the article for one raw item.
    pub async fn process_item(
        &self,
        item: &RawContentItem,
        brief: Option<&SeoBrief>,
    ) -> Result<Article, GenerationError> {
        let kind = item.source.article_kind();
        info!(content_id = %item.content_id, source = %item.source, kind = %kind, "generating article");

        let request = LlmRequest::new(user_prompt(item, kind, brief))
            .with_system(system_prompt())
            .with_limits(self.settings.max_tokens, self.settings.temperature);
        let response = self.llm.generate(request).await.map_err(GenerationError::Llm)?;

        let content = parse_generated(&response.content)?;
        let issues = validate::validate(&content, kind);
        if !issues.is_empty() {
            return Err(GenerationError::Validation(issues));
        }

        let title = match content.h1_title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => polish_title(self.llm.as_ref(), &item.title, item.body_text()).await,
        };

        let mut keywords = clean_keywords(&content.keywords);
        if keywords.len() < MIN_KEYWORDS {
            keywords = seo_keywords(self.llm.as_ref(), &title, &content.body_text()).await;
        }

        let now = Utc::now();
        let mut article_id = Uuid::new_v4().to_string();
        let mut created_at = now;
        let mut slug = slug::slugify(&title);
        match self.articles.find_by_slug(&slug).await.map_err(GenerationError::Storage)? {
            // Regenerating the same source replaces its article in place.
            Some(existing) if existing.raw_content_id == item.content_id => {
                article_id = existing.article_id;
                created_at = existing.created_at;
            }
            Some(_) => slug = slug::with_suffix(&slug, &article_id),
            None => {}
        }

        let images = match (&self.images, item.image_url()) {
            (Some(pipeline), Some(url)) if item.is_image() => {
                let alt = format!("{} - {}", title, item.source.credit_label());
                pipeline.process(&item.content_id, url, &alt).await
            }
            _ => Default::default(),
        };
        let image_url = images::primary_url(&images).or_else(|| item.image_url().map(str::to_string));

        let article = Article {
            article_id,
            slug,
            title,
            meta_title: content.meta_title.trim().to_string(),
            meta_description: content.meta_description.trim().to_string(),
            perex: content.perex.trim().to_string(),
            content: content.sections,
            faq: content.faq,
            keywords,
            estimated_reading_time: content
                .estimated_reading_time
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_READING_TIME.to_string()),
            category: kind.category().to_string(),
            kind,
            status: ArticleStatus::Published,
            source: item.source,
            source_url: item.source_url().map(str::to_string),
            original_date: item.date,
            raw_content_id: item.content_id.clone(),
            author: DEFAULT_AUTHOR.to_string(),
            image_url,
            images,
            published_at: now,
            created_at,
            updated_at: now,
        };

        self.articles.put(&article).await.map_err(GenerationError::Storage)?;
        info!(content_id = %item.content_id, article_id = %article.article_id, slug = %article.slug, "article published");
        Ok(article)
    }
}
