//! Article verdicts from per-segment scores.
//!
//! Severity escalation: the article takes the most severe toxic label that any
//! single healthy segment carries with confidence strictly above the threshold,
//! `non_toxic` when none does. A single very toxic paragraph is enough to flag
//! an otherwise calm article.
//!
//! The `mean` rule runs the same selection over the mean distribution instead.
//! Both rules only ever compare against the threshold from above, so raising
//! it can demote a verdict but never escalate one.

use chrono::{DateTime, Utc};

use crate::config::{AggregatorConfig, CombinationRule};
use crate::error::{PipelineError, Result};
use crate::types::{ArticleScore, Label, LabelCounts, LabelDistribution, SegmentScore};

/// Toxic labels, most severe first.
const ESCALATION_ORDER: [Label; 2] = [Label::VeryToxic, Label::SlightlyToxic];

#[derive(Debug, Clone)]
pub struct Aggregator {
    cfg: AggregatorConfig,
}

impl Aggregator {
    pub fn new(cfg: AggregatorConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn threshold(&self) -> f32 {
        self.cfg.threshold
    }

    pub fn rule(&self) -> CombinationRule {
        self.cfg.rule
    }

    pub fn aggregate(&self, article_id: Option<&str>, scores: &[SegmentScore]) -> Result<ArticleScore> {
        self.aggregate_at(article_id, scores, Utc::now())
    }

    /// Pure form of [`aggregate`](Self::aggregate): same inputs, same output.
    pub fn aggregate_at(
        &self,
        article_id: Option<&str>,
        scores: &[SegmentScore],
        computed_at: DateTime<Utc>,
    ) -> Result<ArticleScore> {
        if scores.is_empty() {
            return Err(PipelineError::InsufficientData(
                "no segments to aggregate".to_string(),
            ));
        }

        let healthy: Vec<&LabelDistribution> = scores
            .iter()
            .filter(|s| !s.degraded)
            .map(|s| &s.label_distribution)
            .collect();
        let degraded_count = scores.len() - healthy.len();
        if healthy.is_empty() {
            return Err(PipelineError::InsufficientData(format!(
                "all {degraded_count} segments failed classification"
            )));
        }

        let mut label_counts = LabelCounts::default();
        for d in &healthy {
            label_counts.increment(d.dominant());
        }

        let (dominant_label, aggregate_score) = match self.cfg.rule {
            CombinationRule::SeverityEscalation => escalate(&healthy, self.cfg.threshold),
            CombinationRule::Mean => mean_rule(&healthy, self.cfg.threshold),
        };

        Ok(ArticleScore {
            article_id: article_id.map(str::to_string),
            dominant_label,
            aggregate_score,
            label_counts,
            degraded_count,
            segment_count: scores.len(),
            computed_at,
        })
    }
}

fn max_confidence(dists: &[&LabelDistribution], label: Label) -> f32 {
    dists.iter().map(|d| d.get(label)).fold(0.0, f32::max)
}

fn escalate(dists: &[&LabelDistribution], threshold: f32) -> (Label, f32) {
    for label in ESCALATION_ORDER {
        let best = max_confidence(dists, label);
        if best > threshold {
            return (label, best);
        }
    }
    (Label::NonToxic, max_confidence(dists, Label::NonToxic))
}

/// Mean distribution over segments.
pub fn mean_distribution(dists: &[&LabelDistribution]) -> LabelDistribution {
    if dists.is_empty() {
        return LabelDistribution::default();
    }
    let n = dists.len() as f32;
    let mut acc = LabelDistribution::default();
    for d in dists {
        acc.non_toxic += d.non_toxic;
        acc.slightly_toxic += d.slightly_toxic;
        acc.very_toxic += d.very_toxic;
    }
    LabelDistribution::new(acc.non_toxic / n, acc.slightly_toxic / n, acc.very_toxic / n)
}

fn mean_rule(dists: &[&LabelDistribution], threshold: f32) -> (Label, f32) {
    let mean = mean_distribution(dists);
    for label in ESCALATION_ORDER {
        if mean.get(label) > threshold {
            return (label, mean.get(label));
        }
    }
    (Label::NonToxic, mean.non_toxic)
}
