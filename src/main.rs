//! Toxic News Service - Binary Entrypoint
//! Boots the Axum HTTP server: config, classifier, store, routes, and the
//! optional background ingest scheduler.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;

use toxic_news::classifier::build_classifier;
use toxic_news::config::PipelineConfig;
use toxic_news::ingest::{
    config::load_feeds_default,
    providers::RssArticleSource,
    scheduler::{spawn_scheduler, IngestSchedulerCfg},
    types::ArticleSource,
};
use toxic_news::metrics::Metrics;
use toxic_news::storage::{JsonFileStore, MemoryStore, ScoreStore};
use toxic_news::ToxicityService;

/// `DATA_DIR` set → JSON files there; otherwise scores live in memory.
async fn open_store() -> anyhow::Result<Arc<dyn ScoreStore>> {
    match std::env::var("DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let store = JsonFileStore::open(dir.trim())
                .await
                .with_context(|| format!("opening store in {dir}"))?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Polling starts only when `INGEST_INTERVAL_SECS` is set and feeds are configured.
fn maybe_spawn_ingest(service: Arc<ToxicityService>) -> anyhow::Result<()> {
    let Some(interval_secs) = std::env::var("INGEST_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
    else {
        return Ok(());
    };
    let feeds = load_feeds_default()?;
    if feeds.is_empty() {
        tracing::warn!("INGEST_INTERVAL_SECS set but no feeds configured");
        return Ok(());
    }
    let client = reqwest::Client::builder()
        .user_agent(concat!("toxic-news/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building feed http client")?;
    let sources: Vec<Box<dyn ArticleSource>> = feeds
        .iter()
        .map(|f| Box::new(RssArticleSource::from_feed(f, client.clone())) as Box<dyn ArticleSource>)
        .collect();
    tracing::info!(feeds = sources.len(), interval_secs, "ingest scheduler enabled");
    let _handle = spawn_scheduler(
        IngestSchedulerCfg { interval_secs },
        sources,
        service,
        CancellationToken::new(),
    );
    Ok(())
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    toxic_news::init_tracing();

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let classifier = build_classifier(&cfg.classifier).context("building classifier")?;
    let store = open_store().await?;
    let service = Arc::new(
        ToxicityService::new(&cfg, classifier, store).context("building toxicity service")?,
    );
    tracing::info!(
        model = service.model(),
        threshold = service.threshold(),
        "toxicity service ready"
    );

    maybe_spawn_ingest(service.clone())?;

    let metrics = Metrics::init()?;
    let router = toxic_news::router(service).merge(metrics.router());

    Ok(router.into())
}
