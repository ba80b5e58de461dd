// src/config/classifier.rs
use serde::{Deserialize, Serialize};
use std::env;

use crate::error::PipelineError;

pub const ENV_CLASSIFIER_ENDPOINT: &str = "CLASSIFIER_ENDPOINT";
pub const ENV_CLASSIFIER_API_KEY: &str = "CLASSIFIER_API_KEY";

fn default_model() -> String {
    "unitary/multilingual-toxic-xlm-roberta".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    4_000
}

/// Which backend answers `classify_segment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierProvider {
    /// Remote inference service speaking the JSON batch protocol.
    Http,
    /// In-process lexicon model (no network).
    #[default]
    Lexicon,
    /// Deterministic scripted classifier for tests and local runs.
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub provider: ClassifierProvider,
    /// Required for `provider = "http"`.
    pub endpoint: Option<String>,
    /// Model name reported by `/predict` and `/health`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token; "ENV" means: read from `CLASSIFIER_API_KEY`.
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: ClassifierProvider::default(),
            endpoint: None,
            model: default_model(),
            api_key: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.provider == ClassifierProvider::Http {
            match self.endpoint.as_deref().map(str::trim) {
                Some(e) if !e.is_empty() => {}
                _ => {
                    return Err(PipelineError::config(
                        "classifier.endpoint is required for the http provider",
                    ))
                }
            }
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::config("classifier.model must not be empty"));
        }
        Ok(())
    }

    /// Resolve the api key, expanding the "ENV" placeholder.
    pub fn resolved_api_key(&self) -> Result<Option<String>, PipelineError> {
        match self.api_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(k) if k.eq_ignore_ascii_case("env") => env::var(ENV_CLASSIFIER_API_KEY)
                .map(Some)
                .map_err(|_| {
                    PipelineError::config(format!("missing {ENV_CLASSIFIER_API_KEY} env var"))
                }),
            Some(k) => Ok(Some(k.to_string())),
        }
    }

    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = env::var(ENV_CLASSIFIER_ENDPOINT) {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                self.endpoint = Some(endpoint.to_string());
            }
        }
    }
}
