//! Source fetchers: pull feeds and APIs, normalise, de-duplicate, insert.
//!
//! A network failure on the feed itself aborts the run with an error; a bad
//! entry only counts as an error in the [`FetchReport`] and the loop goes on.

use anyhow::{Context, Result};
use reqwest::{redirect, Client};
use serde::Serialize;
use tracing::{debug, info, warn};

use common::SourcesConfig;

use crate::model::{ContentSource, RawContentItem};
use crate::store::RawContentStore;

pub mod apod;
pub mod apod_rss;
pub mod dedup;
pub mod hubble;
pub mod normalize;

/// HTTP client shared by the fetchers: timeout, user agent, bounded redirects.
pub fn build_client(config: &SourcesConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.fetch_timeout())
        .user_agent(config.user_agent())
        .redirect(redirect::Policy::limited(config.max_redirects()))
        .build()
        .context("failed to build reqwest client")
}

/// GET a URL and return its body, failing on non-2xx.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("fetch of {} failed with status: {}", url, status);
    }
    response
        .text()
        .await
        .with_context(|| format!("failed to read body of {}", url))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum FetchOutcome {
    Inserted { content_id: String },
    Duplicate,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub title: String,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

/// Aggregate result of one fetcher invocation.
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub source: ContentSource,
    pub total: usize,
    pub processed: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub results: Vec<FetchItemResult>,
}

impl FetchReport {
    pub fn new(source: ContentSource) -> Self {
        Self {
            source,
            total: 0,
            processed: 0,
            duplicates: 0,
            errors: 0,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, title: impl Into<String>, outcome: FetchOutcome) {
        self.total += 1;
        match &outcome {
            FetchOutcome::Inserted { .. } => self.processed += 1,
            FetchOutcome::Duplicate => self.duplicates += 1,
            FetchOutcome::Failed { .. } => self.errors += 1,
        }
        self.results.push(FetchItemResult {
            title: title.into(),
            outcome,
        });
    }

    pub fn record_error(&mut self, title: impl Into<String>, error: &anyhow::Error) {
        let title = title.into();
        warn!(source = %self.source, title = %title, error = %format!("{:#}", error), "skipping feed entry");
        self.record(
            title,
            FetchOutcome::Failed {
                error: format!("{:#}", error),
            },
        );
    }

    pub fn log_summary(&self) {
        info!(
            source = %self.source,
            total = self.total,
            processed = self.processed,
            duplicates = self.duplicates,
            errors = self.errors,
            "fetch finished"
        );
    }
}

/// Duplicate-check then insert one candidate. Not atomic: two concurrent
/// runs may both pass the check.
pub async fn store_candidate(store: &RawContentStore, item: &RawContentItem) -> FetchOutcome {
    match dedup::is_duplicate(store, item.source, item.date, item.guid.as_deref(), &item.title).await {
        Ok(true) => {
            debug!(source = %item.source, date = %item.date, title = %item.title, "duplicate, skipping");
            FetchOutcome::Duplicate
        }
        Ok(false) => match store.insert(item).await {
            Ok(()) => FetchOutcome::Inserted {
                content_id: item.content_id.clone(),
            },
            Err(e) => FetchOutcome::Failed {
                error: format!("{:#}", e),
            },
        },
        Err(e) => FetchOutcome::Failed {
            error: format!("{:#}", e),
        },
    }
}

/// Record the outcome of storing a candidate, logging failures.
pub async fn ingest(store: &RawContentStore, report: &mut FetchReport, item: &RawContentItem) {
    let outcome = store_candidate(store, item).await;
    if let FetchOutcome::Failed { error } = &outcome {
        warn!(source = %item.source, title = %item.title, %error, "failed to store raw item");
    }
    report.record(item.title.clone(), outcome);
}
