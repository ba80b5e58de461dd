// src/ingest/types.rs
use anyhow::Result;
use serde::Deserialize;

use crate::types::Article;

/// Anything that can hand over articles not yet scored.
#[async_trait::async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_new_articles(&self) -> Result<Vec<Article>>;
    fn name(&self) -> &str;
}

/// One configured feed; `site` is the label stats are grouped by.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSpec {
    pub site: String,
    pub url: String,
}
