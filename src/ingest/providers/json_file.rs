use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::ingest::types::ArticleSource;
use crate::ingest::{article_id_for, normalize_text};
use crate::types::Article;

/// Record shape of an exported corpus; `id` defaults to a hash of the URL.
#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    id: Option<String>,
    url: String,
    site: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    text: String,
}

/// Reads a JSON array of articles from disk on every fetch.
pub struct JsonArticleSource {
    path: PathBuf,
}

impl JsonArticleSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn parse_str(s: &str) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let raw: Vec<RawArticle> = serde_json::from_str(s).context("parsing article json")?;
        let out: Vec<Article> = raw
            .into_iter()
            .map(|r| {
                let id = r.id.unwrap_or_else(|| article_id_for(&r.url));
                Article::new(id, r.url, r.site, r.published_at, normalize_text(&r.text))
            })
            .collect();

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_articles_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl ArticleSource for JsonArticleSource {
    async fn fetch_new_articles(&self) -> Result<Vec<Article>> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading articles from {}", self.path.display()))?;
        Self::parse_str(&data)
    }

    fn name(&self) -> &str {
        "json"
    }
}
