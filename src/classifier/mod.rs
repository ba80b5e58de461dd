//! Classifier capability: anything that can turn a text segment into a label distribution.
//!
//! The orchestrator only ever sees [`SegmentClassifier`]; concrete backends are picked
//! by [`build_classifier`] from config:
//!
//! * `CLASSIFIER_TEST_MODE=mock` → deterministic [`ScriptedClassifier`].
//! * `provider = "http"` → remote inference service ([`HttpClassifier`]).
//! * `provider = "lexicon"` → in-process lexicon model ([`LexiconClassifier`]).

pub mod http;
pub mod lexicon;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ClassifierConfig, ClassifierProvider};
use crate::error::{ClassifierError, PipelineError};
use crate::types::LabelDistribution;

pub use http::HttpClassifier;
pub use lexicon::LexiconClassifier;
pub use mock::{Script, ScriptedClassifier};

pub const ENV_CLASSIFIER_TEST_MODE: &str = "CLASSIFIER_TEST_MODE";

#[async_trait]
pub trait SegmentClassifier: Send + Sync {
    /// Classify one segment.
    async fn classify(&self, text: &str) -> Result<LabelDistribution, ClassifierError>;

    /// Classify several segments in one call. Backends with a native batch
    /// endpoint override this; the default classifies one by one.
    async fn classify_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<LabelDistribution>, ClassifierError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.classify(text).await?);
        }
        Ok(out)
    }

    /// Lightweight reachability check used by `health()`.
    async fn probe(&self) -> Result<(), ClassifierError> {
        self.classify("health check").await.map(|_| ())
    }

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Model identifier reported to API clients.
    fn model(&self) -> &str;
}

pub type DynClassifier = Arc<dyn SegmentClassifier>;

/// Factory: build a classifier according to config and environment.
pub fn build_classifier(cfg: &ClassifierConfig) -> Result<DynClassifier, PipelineError> {
    if std::env::var(ENV_CLASSIFIER_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(ScriptedClassifier::neutral()));
    }

    cfg.validate()?;
    let client: DynClassifier = match cfg.provider {
        ClassifierProvider::Http => Arc::new(HttpClassifier::from_config(cfg)?),
        ClassifierProvider::Lexicon => Arc::new(LexiconClassifier::new()),
        ClassifierProvider::Mock => Arc::new(ScriptedClassifier::neutral()),
    };
    tracing::info!(
        provider = client.name(),
        model = client.model(),
        "classifier ready"
    );
    Ok(client)
}
