//! Persistence for articles and their scores.
//!
//! Scores are whole records keyed by article id: saving again overwrites, there
//! is no partial update. Two backends:
//! - [`MemoryStore`]: process-local, for tests and ephemeral runs.
//! - [`JsonFileStore`]: `articles.json` + `scores.json` in a directory, each
//!   rewritten atomically (tmp file + rename) on every save.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::StorageError;
use crate::types::{Article, ArticleScore, ScoredArticle, TimeWindow};

/// Restricts loads by article site and publication time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub site: Option<String>,
    pub window: TimeWindow,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn matches(&self, article: &Article) -> bool {
        self.site.as_deref().is_none_or(|s| s == article.site)
            && self.window.contains(article.published_at)
    }
}

#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn save_article(&self, article: &Article) -> Result<(), StorageError>;

    /// Overwrites any previous score for the same article.
    async fn save_article_score(&self, score: &ArticleScore) -> Result<(), StorageError>;

    /// Scores whose article matches `filter`.
    async fn load_article_scores(&self, filter: &RecordFilter) -> Result<Vec<ArticleScore>, StorageError>;

    async fn load_articles(&self, filter: &RecordFilter) -> Result<Vec<Article>, StorageError>;

    /// Scores joined with article metadata; articles without a score are skipped.
    async fn load_scored(&self, filter: &RecordFilter) -> Result<Vec<ScoredArticle>, StorageError> {
        let articles: HashMap<String, Article> = self
            .load_articles(filter)
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        let scores = self.load_article_scores(filter).await?;
        Ok(scores
            .into_iter()
            .filter_map(|s| {
                let id = s.article_id?;
                let a = articles.get(&id)?;
                Some(ScoredArticle {
                    article_id: id,
                    site: a.site.clone(),
                    published_at: a.published_at,
                    dominant_label: s.dominant_label,
                })
            })
            .collect())
    }

    fn backend(&self) -> &'static str;
}

fn score_key(score: &ArticleScore) -> Result<String, StorageError> {
    score
        .article_id
        .clone()
        .ok_or_else(|| StorageError::Backend("cannot persist a score without article_id".into()))
}

fn select_scores(
    articles: &BTreeMap<String, Article>,
    scores: &BTreeMap<String, ArticleScore>,
    filter: &RecordFilter,
) -> Vec<ArticleScore> {
    scores
        .iter()
        .filter(|(id, _)| articles.get(*id).is_some_and(|a| filter.matches(a)))
        .map(|(_, s)| s.clone())
        .collect()
}

fn select_articles(articles: &BTreeMap<String, Article>, filter: &RecordFilter) -> Vec<Article> {
    articles.values().filter(|a| filter.matches(a)).cloned().collect()
}

// ------------------------------------------------------------
// In-memory
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: RwLock<BTreeMap<String, Article>>,
    scores: RwLock<BTreeMap<String, ArticleScore>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn save_article(&self, article: &Article) -> Result<(), StorageError> {
        self.articles
            .write()
            .await
            .insert(article.id.clone(), article.clone());
        Ok(())
    }

    async fn save_article_score(&self, score: &ArticleScore) -> Result<(), StorageError> {
        let key = score_key(score)?;
        self.scores.write().await.insert(key, score.clone());
        Ok(())
    }

    async fn load_article_scores(&self, filter: &RecordFilter) -> Result<Vec<ArticleScore>, StorageError> {
        let articles = self.articles.read().await;
        let scores = self.scores.read().await;
        Ok(select_scores(&articles, &scores, filter))
    }

    async fn load_articles(&self, filter: &RecordFilter) -> Result<Vec<Article>, StorageError> {
        Ok(select_articles(&*self.articles.read().await, filter))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// ------------------------------------------------------------
// JSON files
// ------------------------------------------------------------

const ARTICLES_FILE: &str = "articles.json";
const SCORES_FILE: &str = "scores.json";

/// Directory-backed store. Every save is read-modify-write of one file under a
/// store-wide lock; fine for the corpus sizes a single scoring run produces.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_map<T: DeserializeOwned>(&self, file: &str) -> Result<BTreeMap<String, T>, StorageError> {
        let path = self.dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map<T: Serialize>(&self, file: &str, map: &BTreeMap<String, T>) -> Result<(), StorageError> {
        let path = self.dir.join(file);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn upsert<T: Serialize + DeserializeOwned>(
        &self,
        file: &str,
        key: String,
        value: T,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut map: BTreeMap<String, T> = self.read_map(file).await?;
        map.insert(key, value);
        self.write_map(file, &map).await
    }
}

#[async_trait]
impl ScoreStore for JsonFileStore {
    async fn save_article(&self, article: &Article) -> Result<(), StorageError> {
        self.upsert(ARTICLES_FILE, article.id.clone(), article.clone())
            .await
    }

    async fn save_article_score(&self, score: &ArticleScore) -> Result<(), StorageError> {
        let key = score_key(score)?;
        self.upsert(SCORES_FILE, key, score.clone()).await
    }

    async fn load_article_scores(&self, filter: &RecordFilter) -> Result<Vec<ArticleScore>, StorageError> {
        let articles = self.read_map::<Article>(ARTICLES_FILE).await?;
        let scores = self.read_map::<ArticleScore>(SCORES_FILE).await?;
        Ok(select_scores(&articles, &scores, filter))
    }

    async fn load_articles(&self, filter: &RecordFilter) -> Result<Vec<Article>, StorageError> {
        let articles = self.read_map::<Article>(ARTICLES_FILE).await?;
        Ok(select_articles(&articles, filter))
    }

    fn backend(&self) -> &'static str {
        "json"
    }
}
