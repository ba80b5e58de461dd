//! # Query Façade
//! [`ToxicityService`] wires segmenter → orchestrator → aggregator for on-demand
//! predictions and article scoring, and reads the store for statistics.
//!
//! The service holds no mutable state of its own; share it behind an `Arc`.
//! Errors from the stages are passed through unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::aggregate::{mean_distribution, Aggregator};
use crate::classifier::DynClassifier;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::orchestrator::Orchestrator;
use crate::segmenter::Segmenter;
use crate::stats::{self, PeriodBucket, PeriodStat, SiteStat};
use crate::storage::{RecordFilter, ScoreStore};
use crate::types::{
    Article, ArticleScore, Label, LabelCounts, LabelDistribution, SegmentScore, TimeWindow,
};

/// Short non-reversible id for log lines; article text itself is never logged.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Verdict for free text submitted to `predict`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub dominant_label: Label,
    pub aggregate_score: f32,
    pub label_counts: LabelCounts,
    pub degraded_count: usize,
    pub segment_count: usize,
    pub computed_at: DateTime<Utc>,
    pub is_toxic: bool,
    /// Mean distribution over the segments that were classified.
    pub per_label: LabelDistribution,
    pub model: String,
    pub threshold: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatsQuery {
    pub site: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

impl StatsQuery {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.period_start, self.period_end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub model: String,
    pub classifier: String,
    pub store: String,
}

pub struct ToxicityService {
    segmenter: Segmenter,
    orchestrator: Orchestrator,
    aggregator: Aggregator,
    store: Arc<dyn ScoreStore>,
}

impl ToxicityService {
    /// Every stage validates its own section of `cfg`; nothing is classified
    /// if any of them is invalid.
    pub fn new(
        cfg: &PipelineConfig,
        classifier: DynClassifier,
        store: Arc<dyn ScoreStore>,
    ) -> Result<Self> {
        Ok(Self {
            segmenter: Segmenter::new(cfg.segmenter)?,
            orchestrator: Orchestrator::new(classifier, cfg.orchestrator)?,
            aggregator: Aggregator::new(cfg.aggregator)?,
            store,
        })
    }

    pub fn model(&self) -> &str {
        self.orchestrator.classifier().model()
    }

    pub fn threshold(&self) -> f32 {
        self.aggregator.threshold()
    }

    pub fn store(&self) -> &Arc<dyn ScoreStore> {
        &self.store
    }

    pub async fn predict(&self, text: &str) -> Result<Prediction> {
        self.predict_with_cancel(text, &CancellationToken::new()).await
    }

    pub async fn predict_with_cancel(&self, text: &str, cancel: &CancellationToken) -> Result<Prediction> {
        let res = self.run_predict(text, cancel).await;
        let outcome = match &res {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        counter!("predict_requests_total", "outcome" => outcome).increment(1);
        res
    }

    async fn run_predict(&self, text: &str, cancel: &CancellationToken) -> Result<Prediction> {
        if text.trim().is_empty() {
            return Err(PipelineError::config("text must not be empty"));
        }
        let text_id = anon_hash(text);
        let segments = self.segmenter.segment("", text);
        let scores = self.orchestrator.classify_with_cancel(&segments, cancel).await?;
        let score = self.aggregator.aggregate(None, &scores).inspect_err(|e| {
            tracing::warn!(text_id = %text_id, kind = e.kind(), "prediction failed");
        })?;

        tracing::info!(
            text_id = %text_id,
            label = %score.dominant_label,
            score = score.aggregate_score,
            segments = score.segment_count,
            degraded = score.degraded_count,
            "prediction"
        );
        Ok(self.prediction(score, &scores))
    }

    fn prediction(&self, score: ArticleScore, scores: &[SegmentScore]) -> Prediction {
        let healthy: Vec<&LabelDistribution> = scores
            .iter()
            .filter(|s| !s.degraded)
            .map(|s| &s.label_distribution)
            .collect();
        Prediction {
            is_toxic: score.dominant_label.is_toxic(),
            per_label: mean_distribution(&healthy),
            model: self.model().to_string(),
            threshold: self.threshold(),
            dominant_label: score.dominant_label,
            aggregate_score: score.aggregate_score,
            label_counts: score.label_counts,
            degraded_count: score.degraded_count,
            segment_count: score.segment_count,
            computed_at: score.computed_at,
        }
    }

    /// Score an article and persist it together with its verdict.
    /// Nothing is written when scoring fails.
    pub async fn score_article(&self, article: &Article) -> Result<ArticleScore> {
        let segments = self.segmenter.segment(&article.id, &article.text);
        let scores = self.orchestrator.classify(&segments).await;
        let score = self.aggregator.aggregate(Some(&article.id), &scores)?;

        // Score first: stats only join articles that have one, so a failed
        // article write leaves nothing visible.
        self.store.save_article_score(&score).await?;
        self.store.save_article(article).await?;
        tracing::debug!(
            article_id = %article.id,
            site = %article.site,
            label = %score.dominant_label,
            score = score.aggregate_score,
            "article scored"
        );
        Ok(score)
    }

    /// Per-site stats ranked most toxic first. An empty corpus yields an empty list.
    pub async fn get_stats(&self, query: &StatsQuery) -> Result<Vec<SiteStat>> {
        let window = query.window();
        if !window.is_valid() {
            return Err(PipelineError::config("period_start must not be after period_end"));
        }
        let filter = RecordFilter {
            site: query.site.clone(),
            window,
        };
        let rows = self.store.load_scored(&filter).await?;
        stats::compute_site_stats_filtered(&rows, query.site.as_deref(), &window)
    }

    pub async fn most_toxic_site(&self, query: &StatsQuery) -> Result<Option<SiteStat>> {
        Ok(self.get_stats(query).await?.into_iter().next())
    }

    pub async fn period_stats(&self, bucket: PeriodBucket, site: Option<&str>) -> Result<Vec<PeriodStat>> {
        let filter = RecordFilter {
            site: site.map(str::to_string),
            window: TimeWindow::default(),
        };
        let rows = self.store.load_scored(&filter).await?;
        Ok(stats::compute_period_stats(&rows, bucket, site))
    }

    /// One probe call against the classifier backend, bounded by the call timeout.
    pub async fn health(&self) -> HealthStatus {
        let classifier = self.orchestrator.classifier();
        let timeout = self.orchestrator.call_timeout();
        let status = match tokio::time::timeout(timeout, classifier.probe()).await {
            Ok(Ok(())) => HealthState::Ok,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, backend = classifier.name(), "classifier probe failed");
                HealthState::Degraded
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    backend = classifier.name(),
                    "classifier probe timed out"
                );
                HealthState::Degraded
            }
        };
        HealthStatus {
            status,
            model: classifier.model().to_string(),
            classifier: classifier.name().to_string(),
            store: self.store.backend().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Script, ScriptedClassifier};
    use crate::storage::MemoryStore;

    fn service(mock: ScriptedClassifier) -> ToxicityService {
        let mut cfg = PipelineConfig::default();
        cfg.orchestrator.initial_backoff_ms = 1;
        cfg.orchestrator.jitter = false;
        ToxicityService::new(&cfg, Arc::new(mock), Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        let h = anon_hash("Un texte.");
        assert_eq!(h.len(), 12);
        assert_eq!(h, anon_hash("Un texte."));
        assert_ne!(h, anon_hash("Un autre texte."));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_classification() {
        let mock = ScriptedClassifier::neutral();
        let svc = service(mock);
        let err = svc.predict("   \n ").await.unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[tokio::test]
    async fn prediction_carries_model_and_threshold() {
        let svc = service(
            ScriptedClassifier::neutral().on("ordure", Script::Fixed(LabelDistribution::new(0.1, 0.2, 0.7))),
        );
        let p = svc.predict("Quelle ordure.").await.unwrap();
        assert_eq!(p.dominant_label, Label::VeryToxic);
        assert!(p.is_toxic);
        assert_eq!(p.model, "scripted-mock");
        assert!((p.threshold - 0.5).abs() < f32::EPSILON);
        assert!((p.per_label.very_toxic - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn inverted_window_is_a_configuration_error() {
        let svc = service(ScriptedClassifier::neutral());
        let q = StatsQuery {
            site: None,
            period_start: Some("2025-02-01T00:00:00Z".parse().unwrap()),
            period_end: Some("2025-01-01T00:00:00Z".parse().unwrap()),
        };
        assert!(matches!(svc.get_stats(&q).await, Err(PipelineError::Configuration(_))));
    }

    struct RejectingScores(MemoryStore);

    #[async_trait::async_trait]
    impl ScoreStore for RejectingScores {
        async fn save_article(&self, article: &Article) -> std::result::Result<(), crate::error::StorageError> {
            self.0.save_article(article).await
        }
        async fn save_article_score(&self, _: &ArticleScore) -> std::result::Result<(), crate::error::StorageError> {
            Err(crate::error::StorageError::Backend("disk full".into()))
        }
        async fn load_article_scores(
            &self,
            filter: &RecordFilter,
        ) -> std::result::Result<Vec<ArticleScore>, crate::error::StorageError> {
            self.0.load_article_scores(filter).await
        }
        async fn load_articles(&self, filter: &RecordFilter) -> std::result::Result<Vec<Article>, crate::error::StorageError> {
            self.0.load_articles(filter).await
        }
        fn backend(&self) -> &'static str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn failed_score_write_leaves_no_article_behind() {
        let store = Arc::new(RejectingScores(MemoryStore::new()));
        let svc = ToxicityService::new(
            &PipelineConfig::default(),
            Arc::new(ScriptedClassifier::neutral()),
            store.clone(),
        )
        .unwrap();
        let a = Article::new(
            "a1",
            "https://x.fr/a1",
            "x.fr",
            "2025-01-10T08:00:00Z".parse().unwrap(),
            "Un texte calme.",
        );
        let err = svc.score_article(&a).await.unwrap_err();
        assert_eq!(err.kind(), "StorageError");
        assert!(store.load_articles(&RecordFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_is_degraded_when_probe_hangs() {
        let mut cfg = PipelineConfig::default();
        cfg.orchestrator.call_timeout_ms = 50;
        let mock = ScriptedClassifier::neutral().slow_probe(std::time::Duration::from_secs(3600));
        let svc = ToxicityService::new(&cfg, Arc::new(mock), Arc::new(MemoryStore::new())).unwrap();
        let h = tokio::time::timeout(std::time::Duration::from_secs(2), svc.health())
            .await
            .expect("health returns within the call timeout");
        assert_eq!(h.status, HealthState::Degraded);
    }

    #[tokio::test]
    async fn predict_future_is_send() {
        let svc = Arc::new(service(ScriptedClassifier::neutral()));
        let p = tokio::spawn(async move { svc.predict("Un texte calme. Et un autre.").await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.dominant_label, Label::NonToxic);
    }

    #[tokio::test]
    async fn health_reports_unreachable_backend() {
        let svc = service(ScriptedClassifier::neutral().unreachable());
        let h = svc.health().await;
        assert_eq!(h.status, HealthState::Degraded);
        assert_eq!(h.store, "memory");
    }
}
