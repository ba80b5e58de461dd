//! In-process lexicon model: a fallback that needs no inference service.
//!
//! Each lexicon word carries a weight in (0, 1]. A segment's toxicity is the
//! noisy-or of the weights of the words it contains, `1 - Π(1 - w)`, which is
//! then spread over the three labels with [`LabelDistribution::from_toxicity`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::SegmentClassifier;
use crate::error::ClassifierError;
use crate::types::LabelDistribution;

static LEXICON: Lazy<HashMap<String, f32>> = Lazy::new(|| {
    let raw = include_str!("../../toxicity_lexicon.json");
    serde_json::from_str::<HashMap<String, f32>>(raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "toxicity lexicon is malformed, scoring everything as clean");
        HashMap::new()
    })
});

#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_weight(&self, w: &str) -> f32 {
        LEXICON.get(w).copied().unwrap_or(0.0).clamp(0.0, 1.0)
    }

    /// Toxicity probability in [0, 1] plus the number of tokens seen.
    pub fn toxicity(&self, text: &str) -> (f32, usize) {
        let mut clean = 1.0f32;
        let mut n = 0usize;
        for tok in tokenize(text) {
            n += 1;
            clean *= 1.0 - self.word_weight(&tok);
        }
        (1.0 - clean, n)
    }
}

/// Alphanumeric tokens, lower-cased (Unicode aware so accented words match).
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl SegmentClassifier for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<LabelDistribution, ClassifierError> {
        let (t, tokens) = self.toxicity(text);
        if tokens == 0 {
            return Err(ClassifierError::Permanent(
                "segment contains no words".to_string(),
            ));
        }
        Ok(LabelDistribution::from_toxicity(t))
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }

    fn model(&self) -> &str {
        "lexicon-v1"
    }
}
