use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use super::{get_document, put_document, query_with_fallback, Document, Lookup, Paginated};
use crate::model::{Article, ArticleKind, ArticleStatus};

pub const IDX_SLUG: &str = "idx_articles_slug";
pub const IDX_CATEGORY: &str = "idx_articles_category";
pub const IDX_TYPE: &str = "idx_articles_type";
pub const IDX_STATUS: &str = "idx_articles_status";

/// Categories shown on the home page, each fetched concurrently.
pub const HOME_CATEGORIES: [&str; 2] = ["objav-dna", "tyzdenny-vyber"];

impl Document for Article {
    const TABLE: &'static str = "articles";
    const KEY: &'static str = "article_id";
    const COLUMNS: &'static [&'static str] = &["slug", "category", "kind", "status", "original_date"];

    fn key(&self) -> &str {
        &self.article_id
    }

    fn field(&self, name: &str) -> Option<String> {
        match name {
            "article_id" => Some(self.article_id.clone()),
            "slug" => Some(self.slug.clone()),
            "category" => Some(self.category.clone()),
            "kind" => Some(self.kind.as_str().to_string()),
            "status" => Some(self.status.as_str().to_string()),
            "original_date" => Some(self.original_date.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    pub latest: Vec<Article>,
    pub categories: BTreeMap<String, Vec<Article>>,
}

/// Published articles; newest original date first on every list.
#[derive(Clone)]
pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn put(&self, article: &Article) -> Result<()> {
        put_document(&self.pool, article).await?;
        info!(article_id = %article.article_id, slug = %article.slug, "article stored");
        Ok(())
    }

    pub async fn get_by_id(&self, article_id: &str) -> Result<Option<Article>> {
        get_document(&self.pool, article_id).await
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let lookup = Lookup::on(IDX_SLUG).key("slug", slug);
        let mut found = query_with_fallback::<Article>(&self.pool, &lookup).await?;
        sort_newest_first(&mut found);
        Ok(found.into_iter().next())
    }

    pub async fn slug_taken(&self, slug: &str) -> Result<bool> {
        let lookup = Lookup::on(IDX_SLUG).key("slug", slug);
        Ok(!query_with_fallback::<Article>(&self.pool, &lookup).await?.is_empty())
    }

    pub async fn list_all(&self, page: Option<usize>, limit: Option<usize>) -> Result<Paginated<Article>> {
        let articles = self.published().await?;
        Ok(Paginated::from_sorted(articles, page, limit))
    }

    pub async fn by_category(
        &self,
        category: &str,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Paginated<Article>> {
        let articles = self.fetch_category(category).await?;
        Ok(Paginated::from_sorted(articles, page, limit))
    }

    pub async fn by_type(&self, kind: ArticleKind, limit: usize) -> Result<Vec<Article>> {
        let lookup = Lookup::on(IDX_TYPE)
            .key("kind", kind.as_str())
            .filter("status", ArticleStatus::Published.as_str());
        let mut articles = query_with_fallback(&self.pool, &lookup).await?;
        sort_newest_first(&mut articles);
        articles.truncate(limit);
        Ok(articles)
    }

    pub async fn latest(&self, limit: usize) -> Result<Vec<Article>> {
        let mut articles = self.published().await?;
        articles.truncate(limit);
        Ok(articles)
    }

    /// Case-insensitive substring search over title, perex, category and
    /// keywords, applied after an indexed fetch by category, type, or status.
    pub async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        kind: Option<ArticleKind>,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Paginated<Article>> {
        let lookup = match (category, kind) {
            (Some(category), kind) => Lookup::on(IDX_CATEGORY)
                .key("category", category)
                .filter_opt("kind", kind.map(|k| k.as_str())),
            (None, Some(kind)) => Lookup::on(IDX_TYPE).key("kind", kind.as_str()),
            (None, None) => Lookup::on(IDX_STATUS).key("status", ArticleStatus::Published.as_str()),
        }
        .filter("status", ArticleStatus::Published.as_str());

        let needle = query.trim().to_lowercase();
        let mut articles: Vec<Article> = query_with_fallback::<Article>(&self.pool, &lookup)
            .await?
            .into_iter()
            .filter(|a| needle.is_empty() || matches_text(a, &needle))
            .collect();
        sort_newest_first(&mut articles);
        Ok(Paginated::from_sorted(articles, page, limit))
    }

    /// Latest articles plus the newest of each home category, fetched concurrently.
    pub async fn home(&self, per_category: usize) -> Result<HomePage> {
        let latest = self.latest(per_category);
        let categories = futures::future::try_join_all(HOME_CATEGORIES.iter().map(|category| async move {
            let mut articles = self.fetch_category(category).await?;
            articles.truncate(per_category);
            Ok::<_, anyhow::Error>((category.to_string(), articles))
        }));

        let (latest, categories) = futures::try_join!(latest, categories)?;
        Ok(HomePage {
            latest,
            categories: categories.into_iter().collect(),
        })
    }

    async fn published(&self) -> Result<Vec<Article>> {
        let lookup = Lookup::on(IDX_STATUS).key("status", ArticleStatus::Published.as_str());
        let mut articles = query_with_fallback(&self.pool, &lookup).await?;
        sort_newest_first(&mut articles);
        Ok(articles)
    }

    async fn fetch_category(&self, category: &str) -> Result<Vec<Article>> {
        let lookup = Lookup::on(IDX_CATEGORY)
            .key("category", category)
            .filter("status", ArticleStatus::Published.as_str());
        let mut articles = query_with_fallback(&self.pool, &lookup).await?;
        sort_newest_first(&mut articles);
        Ok(articles)
    }
}

fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        b.original_date
            .cmp(&a.original_date)
            .then_with(|| b.published_at.cmp(&a.published_at))
    });
}

fn matches_text(article: &Article, needle: &str) -> bool {
    article.title.to_lowercase().contains(needle)
        || article.perex.to_lowercase().contains(needle)
        || article.category.to_lowercase().contains(needle)
        || article.keywords.iter().any(|k| k.to_lowercase().contains(needle))
}
