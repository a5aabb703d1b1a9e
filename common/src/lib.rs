/*!
common/src/lib.rs

Shared configuration types and DB helper functions for Infinite.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader merging a default config file with an override file
- Helpers to initialize and migrate an SQLite database
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/infinite.db")
    pub path: String,
}

/// Source feeds and APIs polled by the fetchers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub nasa_api_url: Option<String>,
    /// Name of the environment variable holding the NASA API key
    pub nasa_api_key_env: Option<String>,
    pub apod_rss_url: Option<String>,
    pub hubble_rss_url: Option<String>,
    pub user_agent: Option<String>,
    pub fetch_timeout_seconds: Option<u64>,
    pub max_redirects: Option<usize>,
}

impl SourcesConfig {
    pub fn nasa_api_url(&self) -> &str {
        self.nasa_api_url
            .as_deref()
            .unwrap_or("https://api.nasa.gov/planetary/apod")
    }

    pub fn nasa_api_key_env(&self) -> &str {
        self.nasa_api_key_env.as_deref().unwrap_or("NASA_API_KEY")
    }

    pub fn apod_rss_url(&self) -> &str {
        self.apod_rss_url
            .as_deref()
            .unwrap_or("https://apod.nasa.gov/apod.rss")
    }

    pub fn hubble_rss_url(&self) -> &str {
        self.hubble_rss_url
            .as_deref()
            .unwrap_or("https://feeds.feedburner.com/esahubble/images/potw/")
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .unwrap_or("InfiniteBot/1.0 (+https://infinite.sk)")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds.unwrap_or(10))
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects.unwrap_or(3)
    }
}

/// AI text generation service (OpenAI-compatible chat completions endpoint)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

impl LlmConfig {
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1/chat/completions")
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY")
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("gpt-4o")
    }
}

pub const MAX_IMAGE_ATTEMPTS: u32 = 10;

/// Image caching: where resized crops are written and how downloads retry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Root directory of the object store
    pub root: Option<String>,
    /// Public URL prefix under which stored keys are served
    pub public_base_url: Option<String>,
    pub download_timeout_seconds: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_base_millis: Option<u64>,
    /// Disable the image step entirely
    pub disabled: Option<bool>,
}

impl ImagesConfig {
    pub fn root(&self) -> &str {
        self.root.as_deref().unwrap_or("data/objects")
    }

    pub fn public_base_url(&self) -> &str {
        self.public_base_url
            .as_deref()
            .unwrap_or("http://localhost:8000/objects")
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds.unwrap_or(30))
    }

    /// Between 1 and [`MAX_IMAGE_ATTEMPTS`].
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(3).clamp(1, MAX_IMAGE_ATTEMPTS)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_millis.unwrap_or(200))
    }
}

/// HTTP server section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// Include error details in JSON error bodies (development only)
    pub expose_errors: Option<bool>,
}

/// Interval worker running all fetchers and the generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub interval_minutes: Option<u64>,
}

impl WorkerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.unwrap_or(60).max(1) * 60)
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    pub fn expose_errors(&self) -> bool {
        self.server.expose_errors.unwrap_or(false)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Run the embedded SQL migrations from the workspace `migrations` directory.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("Failed to run sqlx migrations")?;

    Ok(())
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory if necessary and returns a WAL-mode pool.
///
/// Example:
///   let pool = init_db_pool("data/infinite.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

/// Single-connection in-memory pool, migrated. Every connection of an in-memory
/// SQLite pool would otherwise see its own empty database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory sqlite database")?;
    run_migrations(&pool).await?;
    Ok(pool)
}
