//! # Classification Orchestrator
//! Drives a [`SegmentClassifier`] over an article's segments.
//!
//! - Segments are sent in batches of `batch_size`, at most `max_concurrent_batches`
//!   in flight; results are reassembled by input position, never arrival order.
//! - Every call runs under `call_timeout_ms`; a timeout counts as a transient failure.
//! - Transient failures are retried with backoff (see [`crate::retry`]).
//! - A batch rejected permanently is retried segment by segment, so one bad segment
//!   cannot drag its neighbours down. A batch that runs out of transient retries
//!   is degraded as a whole; the backend is down and more calls only add latency.
//!   A degraded segment never aborts the article.
//!
//! Output always has exactly one [`SegmentScore`] per input [`Segment`], in input order.

use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;

use crate::classifier::DynClassifier;
use crate::config::OrchestratorConfig;
use crate::error::{ClassifierError, PipelineError, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{LabelDistribution, Segment, SegmentScore};

pub struct Orchestrator {
    classifier: DynClassifier,
    cfg: OrchestratorConfig,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(classifier: DynClassifier, cfg: OrchestratorConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            classifier,
            retry: cfg.retry_policy(),
            cfg,
        })
    }

    pub fn classifier(&self) -> &DynClassifier {
        &self.classifier
    }

    /// Deadline applied to every classifier call, probes included.
    pub fn call_timeout(&self) -> std::time::Duration {
        self.cfg.call_timeout()
    }

    /// Classify all segments; never fails, failures surface as degraded scores.
    pub async fn classify(&self, segments: &[Segment]) -> Vec<SegmentScore> {
        if segments.is_empty() {
            return Vec::new();
        }
        let batch_size = self.cfg.batch_size;

        let batches: Vec<BoxFuture<'_, (usize, Vec<SegmentScore>)>> = segments
            .chunks(batch_size)
            .enumerate()
            .map(|(i, batch)| -> BoxFuture<'_, (usize, Vec<SegmentScore>)> {
                Box::pin(async move { (i * batch_size, self.run_batch(batch).await) })
            })
            .collect();

        let mut done: Vec<(usize, Vec<SegmentScore>)> = stream::iter(batches)
            .buffer_unordered(self.cfg.max_concurrent_batches)
            .collect()
            .await;

        done.sort_by_key(|(offset, _)| *offset);
        done.into_iter().flat_map(|(_, scores)| scores).collect()
    }

    /// Like [`classify`](Self::classify), but gives up as soon as `cancel` fires.
    /// In-flight classifier calls for this request are dropped; nothing else is touched.
    pub async fn classify_with_cancel(
        &self,
        segments: &[Segment],
        cancel: &CancellationToken,
    ) -> Result<Vec<SegmentScore>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            scores = self.classify(segments) => Ok(scores),
        }
    }

    async fn run_batch(&self, batch: &[Segment]) -> Vec<SegmentScore> {
        let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
        match with_retry(&self.retry, || self.call(&texts)).await {
            Ok(dists) => batch
                .iter()
                .zip(dists)
                .map(|(seg, d)| SegmentScore::classified(seg.index, d))
                .collect(),
            Err(e @ ClassifierError::Permanent(_)) if batch.len() > 1 => {
                tracing::debug!(
                    error = %e,
                    first_index = batch[0].index,
                    size = batch.len(),
                    "batch failed, isolating segments"
                );
                let mut out = Vec::with_capacity(batch.len());
                for seg in batch {
                    out.push(self.run_single(seg).await);
                }
                out
            }
            Err(e) => batch.iter().map(|seg| self.degrade(seg, &e)).collect(),
        }
    }

    async fn run_single(&self, seg: &Segment) -> SegmentScore {
        let texts = std::slice::from_ref(&seg.text);
        match with_retry(&self.retry, || self.call(texts)).await {
            Ok(mut d) => match d.pop() {
                Some(dist) => SegmentScore::classified(seg.index, dist),
                None => self.degrade(seg, &ClassifierError::Permanent("no prediction".into())),
            },
            Err(e) => self.degrade(seg, &e),
        }
    }

    /// One timed classifier call with output validation.
    async fn call(&self, texts: &[String]) -> std::result::Result<Vec<LabelDistribution>, ClassifierError> {
        counter!("classifier_calls_total").increment(1);
        let started = Instant::now();
        let timeout = self.cfg.call_timeout();
        let res = match tokio::time::timeout(timeout, self.classifier.classify_batch(texts)).await {
            Ok(r) => r,
            Err(_) => Err(ClassifierError::Transient(format!(
                "classifier call timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        histogram!("classify_batch_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        let dists = res?;
        if dists.len() != texts.len() {
            return Err(ClassifierError::Permanent(format!(
                "expected {} distributions, got {}",
                texts.len(),
                dists.len()
            )));
        }
        dists
            .into_iter()
            .map(|d| d.normalized().map_err(ClassifierError::Permanent))
            .collect()
    }

    fn degrade(&self, seg: &Segment, err: &ClassifierError) -> SegmentScore {
        counter!("segments_degraded_total").increment(1);
        tracing::warn!(
            article_id = %seg.article_id,
            segment_index = seg.index,
            kind = err.kind(),
            error = %err,
            "segment degraded"
        );
        SegmentScore::degraded(seg.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Script, ScriptedClassifier};
    use crate::types::{Label, SegmentLabel};
    use std::sync::Arc;
    use std::time::Duration;

    fn segs(texts: &[&str]) -> Vec<Segment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Segment {
                article_id: "a".into(),
                index: i,
                text: t.to_string(),
                start_offset: 0,
                end_offset: t.len(),
            })
            .collect()
    }

    fn cfg(batch_size: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            batch_size,
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            jitter: false,
            call_timeout_ms: 200,
            max_concurrent_batches: 3,
            ..OrchestratorConfig::default()
        }
    }

    #[tokio::test]
    async fn preserves_order_across_concurrent_batches() {
        let slow = LabelDistribution::new(0.1, 0.1, 0.8);
        let mock = ScriptedClassifier::neutral()
            .on("slow", Script::Delay(Duration::from_millis(40), slow));
        let orch = Orchestrator::new(Arc::new(mock), cfg(1)).unwrap();
        let input = segs(&["slow one", "fast", "fast too", "slow two"]);
        let out = orch.classify(&input).await;
        let idx: Vec<usize> = out.iter().map(|s| s.segment_index).collect();
        assert_eq!(idx, vec![0, 1, 2, 3]);
        assert_eq!(out[0].dominant_label, SegmentLabel::VeryToxic);
        assert_eq!(out[1].dominant_label, SegmentLabel::NonToxic);
    }

    #[tokio::test]
    async fn permanent_failure_degrades_only_that_segment() {
        let mock = Arc::new(ScriptedClassifier::neutral().on("BAD", Script::FailPermanent));
        let orch = Orchestrator::new(mock.clone(), cfg(3)).unwrap();
        let out = orch.classify(&segs(&["ok", "BAD", "ok again"])).await;
        assert_eq!(out.len(), 3);
        assert!(!out[0].degraded);
        assert!(out[1].degraded);
        assert_eq!(out[1].dominant_label, SegmentLabel::Unknown);
        assert!(!out[2].degraded);
        assert_eq!(out[2].label_distribution.dominant(), Label::NonToxic);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_recovers() {
        let toxic = LabelDistribution::new(0.05, 0.15, 0.8);
        let mock = Arc::new(
            ScriptedClassifier::neutral().on("flaky", Script::FailTransient { times: 2, then: toxic }),
        );
        let orch = Orchestrator::new(mock.clone(), cfg(1)).unwrap();
        let out = orch.classify(&segs(&["flaky text"])).await;
        assert!(!out[0].degraded);
        assert_eq!(out[0].dominant_label, SegmentLabel::VeryToxic);
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_degrade() {
        let mock = Arc::new(ScriptedClassifier::neutral().on("down", Script::AlwaysTransient));
        let orch = Orchestrator::new(mock.clone(), cfg(1)).unwrap();
        let out = orch.classify(&segs(&["down"])).await;
        assert!(out[0].degraded);
        assert_eq!(mock.calls(), 3, "initial attempt plus max_retries");
    }

    #[tokio::test]
    async fn outage_degrades_whole_batch_without_per_segment_retries() {
        let mock = Arc::new(ScriptedClassifier::neutral().on("down", Script::AlwaysTransient));
        let mut c = cfg(8);
        c.max_concurrent_batches = 1;
        let orch = Orchestrator::new(mock.clone(), c).unwrap();
        let input: Vec<Segment> = segs(&["down"; 8]);
        let out = orch.classify(&input).await;
        assert_eq!(out.len(), 8);
        assert!(out.iter().all(|s| s.degraded));
        // Three batch attempts; the default batch call stops at the first failure.
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn classify_future_can_be_spawned() {
        let orch = Arc::new(Orchestrator::new(Arc::new(ScriptedClassifier::neutral()), cfg(2)).unwrap());
        let input = segs(&["un", "deux", "trois"]);
        let out = tokio::spawn(async move { orch.classify(&input).await })
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn slow_call_times_out_and_degrades() {
        let mock = ScriptedClassifier::neutral().on(
            "stuck",
            Script::Delay(Duration::from_secs(5), LabelDistribution::uniform()),
        );
        let mut c = cfg(1);
        c.call_timeout_ms = 20;
        c.max_retries = 0;
        let orch = Orchestrator::new(Arc::new(mock), c).unwrap();
        let out = orch.classify(&segs(&["stuck"])).await;
        assert!(out[0].degraded);
    }

    #[tokio::test]
    async fn cancellation_stops_the_request() {
        let mock = ScriptedClassifier::neutral().on(
            "stuck",
            Script::Delay(Duration::from_secs(5), LabelDistribution::uniform()),
        );
        let mut c = cfg(1);
        c.call_timeout_ms = 10_000;
        let orch = Orchestrator::new(Arc::new(mock), c).unwrap();
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            child.cancel();
        });
        let err = orch
            .classify_with_cancel(&segs(&["stuck"]), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let mock = Arc::new(ScriptedClassifier::neutral());
        let orch = Orchestrator::new(mock.clone(), cfg(4)).unwrap();
        assert!(orch.classify(&[]).await.is_empty());
        assert_eq!(mock.calls(), 0);
    }
}
