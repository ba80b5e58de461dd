//! # Domain types
//! Articles, segments, per-segment and per-article scores.
//!
//! Everything here is plain data shared by the pipeline stages. Label order
//! matters: `non_toxic < slightly_toxic < very_toxic` is both the severity
//! order and the tie-break order used when two labels share a confidence.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Article-level (and per-segment) toxicity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    NonToxic,
    SlightlyToxic,
    VeryToxic,
}

impl Label {
    /// All labels in severity (and tie-break) order.
    pub const ALL: [Label; 3] = [Label::NonToxic, Label::SlightlyToxic, Label::VeryToxic];

    pub fn index(self) -> usize {
        match self {
            Label::NonToxic => 0,
            Label::SlightlyToxic => 1,
            Label::VeryToxic => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::NonToxic => "non_toxic",
            Label::SlightlyToxic => "slightly_toxic",
            Label::VeryToxic => "very_toxic",
        }
    }

    pub fn is_toxic(self) -> bool {
        self != Label::NonToxic
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-segment verdict; `Unknown` marks a degraded segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentLabel {
    NonToxic,
    SlightlyToxic,
    VeryToxic,
    Unknown,
}

impl SegmentLabel {
    pub fn label(self) -> Option<Label> {
        match self {
            SegmentLabel::NonToxic => Some(Label::NonToxic),
            SegmentLabel::SlightlyToxic => Some(Label::SlightlyToxic),
            SegmentLabel::VeryToxic => Some(Label::VeryToxic),
            SegmentLabel::Unknown => None,
        }
    }
}

impl From<Label> for SegmentLabel {
    fn from(l: Label) -> Self {
        match l {
            Label::NonToxic => SegmentLabel::NonToxic,
            Label::SlightlyToxic => SegmentLabel::SlightlyToxic,
            Label::VeryToxic => SegmentLabel::VeryToxic,
        }
    }
}

/// Probability per label. Sums to 1 within [`LabelDistribution::SUM_TOLERANCE`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub non_toxic: f32,
    pub slightly_toxic: f32,
    pub very_toxic: f32,
}

impl LabelDistribution {
    pub const SUM_TOLERANCE: f32 = 1e-3;

    pub fn new(non_toxic: f32, slightly_toxic: f32, very_toxic: f32) -> Self {
        Self {
            non_toxic,
            slightly_toxic,
            very_toxic,
        }
    }

    /// Placeholder distribution carried by degraded segments.
    pub fn uniform() -> Self {
        let third = 1.0 / 3.0;
        Self::new(third, third, third)
    }

    /// Spread a single toxicity probability `t` over the three labels:
    /// `non = 1 - t`, `slightly = t(1 - t)`, `very = t²`. Always sums to 1.
    pub fn from_toxicity(t: f32) -> Self {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        Self::new(1.0 - t, t * (1.0 - t), t * t)
    }

    pub fn get(&self, label: Label) -> f32 {
        match label {
            Label::NonToxic => self.non_toxic,
            Label::SlightlyToxic => self.slightly_toxic,
            Label::VeryToxic => self.very_toxic,
        }
    }

    pub fn sum(&self) -> f32 {
        self.non_toxic + self.slightly_toxic + self.very_toxic
    }

    /// Highest-probability label; ties go to the lowest label index.
    pub fn dominant(&self) -> Label {
        let mut best = Label::NonToxic;
        for label in [Label::SlightlyToxic, Label::VeryToxic] {
            if self.get(label) > self.get(best) {
                best = label;
            }
        }
        best
    }

    /// Validate a raw classifier output, renormalising when the mass is off.
    pub fn normalized(self) -> Result<Self, String> {
        let parts = [self.non_toxic, self.slightly_toxic, self.very_toxic];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(format!("invalid probabilities {parts:?}"));
        }
        let sum = self.sum();
        if sum <= 0.0 {
            return Err("distribution has no probability mass".to_string());
        }
        if (sum - 1.0).abs() <= Self::SUM_TOLERANCE {
            return Ok(self);
        }
        Ok(Self::new(
            self.non_toxic / sum,
            self.slightly_toxic / sum,
            self.very_toxic / sum,
        ))
    }
}

/// Number of items carrying each label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelCounts {
    pub non_toxic: usize,
    pub slightly_toxic: usize,
    pub very_toxic: usize,
}

impl LabelCounts {
    pub fn get(&self, label: Label) -> usize {
        match label {
            Label::NonToxic => self.non_toxic,
            Label::SlightlyToxic => self.slightly_toxic,
            Label::VeryToxic => self.very_toxic,
        }
    }

    pub fn increment(&mut self, label: Label) {
        match label {
            Label::NonToxic => self.non_toxic += 1,
            Label::SlightlyToxic => self.slightly_toxic += 1,
            Label::VeryToxic => self.very_toxic += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.non_toxic + self.slightly_toxic + self.very_toxic
    }

    pub fn toxic(&self) -> usize {
        self.slightly_toxic + self.very_toxic
    }
}

/// Share of items per label; only built for non-empty counts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelProportions {
    pub non_toxic: f64,
    pub slightly_toxic: f64,
    pub very_toxic: f64,
}

impl LabelProportions {
    pub fn from_counts(counts: &LabelCounts) -> Option<Self> {
        let total = counts.total();
        if total == 0 {
            return None;
        }
        let n = total as f64;
        Some(Self {
            non_toxic: counts.non_toxic as f64 / n,
            slightly_toxic: counts.slightly_toxic as f64 / n,
            very_toxic: counts.very_toxic as f64 / n,
        })
    }

    pub fn get(&self, label: Label) -> f64 {
        match label {
            Label::NonToxic => self.non_toxic,
            Label::SlightlyToxic => self.slightly_toxic,
            Label::VeryToxic => self.very_toxic,
        }
    }

    pub fn sum(&self) -> f64 {
        self.non_toxic + self.slightly_toxic + self.very_toxic
    }
}

/// A news article as delivered by the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub url: String,
    pub site: String,
    pub published_at: DateTime<Utc>,
    pub text: String,
    /// Length of `text` in chars.
    pub text_length: usize,
}

impl Article {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        site: impl Into<String>,
        published_at: DateTime<Utc>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            url: url.into(),
            site: site.into(),
            published_at,
            text_length: text.chars().count(),
            text,
        }
    }
}

/// A bounded slice of an article's text. Offsets are byte offsets into the
/// source text, so `&text[start_offset..end_offset] == segment.text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub article_id: String,
    pub index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Classifier verdict for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentScore {
    pub segment_index: usize,
    pub label_distribution: LabelDistribution,
    pub dominant_label: SegmentLabel,
    #[serde(default)]
    pub degraded: bool,
}

impl SegmentScore {
    pub fn classified(segment_index: usize, label_distribution: LabelDistribution) -> Self {
        Self {
            segment_index,
            label_distribution,
            dominant_label: label_distribution.dominant().into(),
            degraded: false,
        }
    }

    pub fn degraded(segment_index: usize) -> Self {
        Self {
            segment_index,
            label_distribution: LabelDistribution::uniform(),
            dominant_label: SegmentLabel::Unknown,
            degraded: true,
        }
    }
}

/// Article-level verdict produced by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleScore {
    /// Absent for on-demand predictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    pub dominant_label: Label,
    pub aggregate_score: f32,
    pub label_counts: LabelCounts,
    #[serde(default)]
    pub degraded_count: usize,
    pub segment_count: usize,
    pub computed_at: DateTime<Utc>,
}

/// An [`ArticleScore`] joined with the metadata the stats engine groups by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredArticle {
    pub article_id: String,
    pub site: String,
    pub published_at: DateTime<Utc>,
    pub dominant_label: Label,
}

/// Half-open time range `[start, end)`; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(s), Some(e)) => s <= e,
            _ => true,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| ts >= s) && self.end.is_none_or(|e| ts < e)
    }
}
