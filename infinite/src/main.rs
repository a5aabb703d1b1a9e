/*
infinite - single binary for the astronomy content pipeline.
Runs the fetchers and the article generator on demand, on an interval, or serves the read API.
*/

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::select;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::{init_db_pool, run_migrations, Config};
use infinite::fetch::apod::ApodClient;
use infinite::fetch::apod_rss::ApodRssFetcher;
use infinite::fetch::hubble::HubbleFetcher;
use infinite::fetch::{build_client, FetchReport};
use infinite::generator::{ContentGenerator, GeneratorSettings, WorkSelection};
use infinite::images::{FsObjectStore, ImagePipeline};
use infinite::llm::remote::RemoteLlmProvider;
use infinite::llm::LlmProvider;
use infinite::model::ContentSource;
use infinite::server::{self, AppState};
use infinite::store::{ArticleStore, RawContentStore};

/// NASA accepts this key with tight rate limits.
const NASA_DEMO_KEY: &str = "DEMO_KEY";

#[derive(Parser, Debug)]
#[command(name = "infinite", about = "Astronomy content pipeline: fetchers, generator and read API")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the read API and the reprocess trigger
    Serve,
    /// Fetch the NASA APOD entry for today or a given date
    FetchApod {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
    /// Fetch the APOD RSS mirror
    FetchApodRss,
    /// Fetch the ESA Hubble picture-of-the-week feed
    FetchHubble {
        #[arg(long, default_value = "esa-hubble")]
        source: ContentSource,
    },
    /// Generate articles for pending items, or for one named item
    Generate {
        #[arg(long, requires = "source")]
        content_id: Option<String>,
        #[arg(long, requires = "content_id")]
        source: Option<ContentSource>,
    },
    /// Run every fetcher and then the generator on an interval until Ctrl-C
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    let pool = match init_db_pool(&config.database.path).await {
        Ok(p) => p,
        Err(e) => {
            error!(%e, db_path = %config.database.path, "failed to initialize database pool");
            return Err(e);
        }
    };
    run_migrations(&pool).await?;
    info!(db_path = %config.database.path, "database ready");

    let raw = RawContentStore::new(pool.clone());
    let articles = ArticleStore::new(pool);

    match args.command {
        Command::Serve => {
            let generator = Arc::new(build_generator(&config, raw.clone(), articles.clone())?);
            let state = AppState {
                raw,
                articles,
                generator,
                apod: build_apod_client(&config)?,
                expose_errors: config.expose_errors(),
            };
            server::launch(state, config.server.bind.as_deref(), config.server.port).await
        }
        Command::FetchApod { date } => {
            let report = build_apod_client(&config)?.run(&raw, date).await?;
            print_json(&report)
        }
        Command::FetchApodRss => {
            let fetcher = ApodRssFetcher::new(build_client(&config.sources)?, config.sources.apod_rss_url());
            print_json(&fetcher.run(&raw).await?)
        }
        Command::FetchHubble { source } => {
            let fetcher = HubbleFetcher::new(build_client(&config.sources)?, config.sources.hubble_rss_url(), source);
            print_json(&fetcher.run(&raw).await?)
        }
        Command::Generate { content_id, source } => {
            let generator = build_generator(&config, raw, articles)?;
            let selection = match (content_id, source) {
                (Some(content_id), Some(source)) => WorkSelection::Single {
                    content_id,
                    source,
                    bypass_status: false,
                    brief: None,
                },
                _ => WorkSelection::Pending,
            };
            print_json(&generator.run(selection).await?)
        }
        Command::Worker => {
            let generator = build_generator(&config, raw.clone(), articles)?;
            let shutdown = Arc::new(Notify::new());
            let worker = run_worker(&config, &raw, &generator, shutdown.clone());

            tokio::pin!(worker);
            select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("ctrl-c received, notifying worker to shutdown");
                    shutdown.notify_waiters();
                    Ok(())
                }
                res = &mut worker => res,
            }
        }
    }
}

/// `config.default.toml` merged with `--config` (must exist) or `./config.toml`.
async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .map_err(|e| {
        error!(%e, "failed to load configuration");
        e
    })?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

fn build_apod_client(config: &Config) -> Result<ApodClient> {
    let key_env = config.sources.nasa_api_key_env();
    let api_key = std::env::var(key_env).unwrap_or_else(|_| {
        warn!(env = key_env, "NASA API key not set, using the demo key");
        NASA_DEMO_KEY.to_string()
    });
    Ok(ApodClient::new(
        build_client(&config.sources)?,
        config.sources.nasa_api_url(),
        api_key,
    ))
}

fn build_llm(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let llm = &config.llm;
    let api_key = std::env::var(llm.api_key_env())
        .with_context(|| format!("LLM API key env var '{}' not set", llm.api_key_env()))?;

    let provider = RemoteLlmProvider::new(llm.api_url(), api_key, llm.model()).with_defaults(
        llm.timeout_seconds.unwrap_or(120),
        llm.max_tokens.unwrap_or(6000),
        llm.temperature.unwrap_or(0.7),
    );
    info!(model = %provider.model(), "LLM provider initialized");
    Ok(Arc::new(provider))
}

fn build_generator(config: &Config, raw: RawContentStore, articles: ArticleStore) -> Result<ContentGenerator> {
    let mut settings = GeneratorSettings::default();
    if let Some(max_tokens) = config.llm.max_tokens {
        settings.max_tokens = max_tokens;
    }
    if let Some(temperature) = config.llm.temperature {
        settings.temperature = temperature;
    }

    let generator = ContentGenerator::new(raw, articles, build_llm(config)?).with_settings(settings);
    if config.images.disabled.unwrap_or(false) {
        info!("image pipeline disabled");
        return Ok(generator);
    }

    let store = FsObjectStore::new(config.images.root(), config.images.public_base_url());
    let pipeline = ImagePipeline::new(Arc::new(store), &config.images, config.sources.user_agent())?;
    Ok(generator.with_images(pipeline))
}

fn print_json<T: serde::Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn log_run(name: &str, result: Result<FetchReport>) {
    match result {
        Ok(report) => info!(fetcher = name, processed = report.processed, duplicates = report.duplicates, errors = report.errors, "fetch run finished"),
        Err(e) => error!(fetcher = name, error = %format!("{:#}", e), "fetch run failed"),
    }
}

/// Fetch every source, then generate, then sleep until the next tick or shutdown.
async fn run_worker(
    config: &Config,
    raw: &RawContentStore,
    generator: &ContentGenerator,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let interval = config.worker.interval();
    let client = build_client(&config.sources)?;
    let apod = build_apod_client(config)?;
    let apod_rss = ApodRssFetcher::new(client.clone(), config.sources.apod_rss_url());
    let hubble = HubbleFetcher::new(client, config.sources.hubble_rss_url(), ContentSource::EsaHubble);
    info!(interval_secs = interval.as_secs(), "worker starting");

    loop {
        log_run("apod", apod.run(raw, None).await);
        log_run("apod-rss", apod_rss.run(raw).await);
        log_run("esa-hubble", hubble.run(raw).await);

        match generator.run(WorkSelection::Pending).await {
            Ok(report) => info!(total = report.total, processed = report.processed, errors = report.errors, "worker: generation finished"),
            Err(e) => error!(error = %format!("{:#}", e), "worker: generation failed"),
        }

        select! {
            _ = tokio::time::sleep(interval) => {},
            _ = shutdown.notified() => {
                info!("worker: shutdown requested, exiting loop");
                break;
            }
        }
    }

    info!("worker: cleanup complete");
    Ok(())
}
