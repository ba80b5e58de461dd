//! Score a JSON corpus of articles and print per-site toxicity statistics.
//!
//! Usage: `score-corpus <articles.json> [--site SITE]`
//! Scores are persisted under `$DATA_DIR` when set, otherwise kept in memory.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use toxic_news::classifier::build_classifier;
use toxic_news::config::PipelineConfig;
use toxic_news::ingest::{self, providers::JsonArticleSource, types::ArticleSource};
use toxic_news::stats::render_site_table;
use toxic_news::storage::{JsonFileStore, MemoryStore, ScoreStore};
use toxic_news::{StatsQuery, ToxicityService};

struct Args {
    input: String,
    site: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut site = None;
    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--site" => site = Some(it.next().ok_or_else(|| anyhow!("--site needs a value"))?),
            _ if input.is_none() => input = Some(a),
            other => return Err(anyhow!("unexpected argument: {other}")),
        }
    }
    Ok(Args {
        input: input.ok_or_else(|| anyhow!("usage: score-corpus <articles.json> [--site SITE]"))?,
        site,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    toxic_news::init_tracing();
    let args = parse_args()?;

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let classifier = build_classifier(&cfg.classifier).context("building classifier")?;
    let store: Arc<dyn ScoreStore> = match std::env::var("DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => Arc::new(JsonFileStore::open(dir.trim()).await?),
        _ => Arc::new(MemoryStore::new()),
    };
    let service = ToxicityService::new(&cfg, classifier, store).context("building toxicity service")?;

    let sources: Vec<Box<dyn ArticleSource>> = vec![Box::new(JsonArticleSource::new(&args.input))];
    let summary = ingest::run_once(&sources, &service).await;
    if summary.source_errors > 0 {
        return Err(anyhow!("could not read articles from {}", args.input));
    }
    println!(
        "processed {} articles: {} scored, {} empty, {} failed",
        summary.processed, summary.scored, summary.skipped_empty, summary.failed
    );

    let query = StatsQuery {
        site: args.site,
        ..StatsQuery::default()
    };
    let stats = service.get_stats(&query).await?;
    print!("{}", render_site_table(&stats));
    match stats.first() {
        Some(top) => println!(
            "most toxic site: {} ({:.1}% toxic over {} articles)",
            top.site,
            top.toxic_proportion * 100.0,
            top.article_count
        ),
        None => println!("no scored articles"),
    }
    Ok(())
}
