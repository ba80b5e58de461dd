//! Remote inference service client.
//!
//! Wire protocol (JSON over HTTP POST to `endpoint`):
//! ```text
//! request:  {"model": "...", "texts": ["segment one", "segment two"]}
//! response: {"predictions": [{"non_toxic": 0.9, "slightly_toxic": 0.07, "very_toxic": 0.03}, ...]}
//! ```
//! 429 and 5xx answers, timeouts and connection failures are transient; any other
//! error status or an undecodable body is permanent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::SegmentClassifier;
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, PipelineError};
use crate::types::LabelDistribution;

pub struct HttpClassifier {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct Resp {
    predictions: Vec<LabelDistribution>,
}

impl HttpClassifier {
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self, PipelineError> {
        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or_else(|| PipelineError::config("classifier.endpoint is not set"))?;
        // Per-call deadlines are enforced by the orchestrator; this only bounds connects.
        let http = reqwest::Client::builder()
            .user_agent(concat!("toxic-news/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .build()
            .map_err(|e| PipelineError::config(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            model: cfg.model.clone(),
            api_key: cfg.resolved_api_key()?,
        })
    }

    fn classify_status(status: StatusCode, body: &str) -> ClassifierError {
        let snippet: String = body.chars().take(200).collect();
        let msg = format!("classifier answered {status}: {snippet}");
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ClassifierError::Transient(msg)
        } else {
            ClassifierError::Permanent(msg)
        }
    }
}

#[async_trait]
impl SegmentClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<LabelDistribution, ClassifierError> {
        let mut out = self.classify_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| ClassifierError::Permanent("empty prediction list".to_string()))
    }

    async fn classify_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<LabelDistribution>, ClassifierError> {
        let mut req = self.http.post(&self.endpoint).json(&Req {
            model: &self.model,
            texts,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ClassifierError::Transient(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Permanent(format!("undecodable response: {e}")))?;
        if body.predictions.len() != texts.len() {
            return Err(ClassifierError::Permanent(format!(
                "expected {} predictions, got {}",
                texts.len(),
                body.predictions.len()
            )));
        }
        body.predictions
            .into_iter()
            .map(|d| d.normalized().map_err(ClassifierError::Permanent))
            .collect()
    }

    fn name(&self) -> &'static str {
        "http"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_splits_transient_and_permanent() {
        assert!(matches!(
            HttpClassifier::classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ClassifierError::Transient(_)
        ));
        assert!(matches!(
            HttpClassifier::classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ClassifierError::Transient(_)
        ));
        assert!(matches!(
            HttpClassifier::classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad text"),
            ClassifierError::Permanent(_)
        ));
    }

    #[test]
    fn requires_endpoint() {
        let cfg = ClassifierConfig::default();
        assert!(HttpClassifier::from_config(&cfg).is_err());
        let cfg = ClassifierConfig {
            endpoint: Some("http://127.0.0.1:9/classify".into()),
            ..ClassifierConfig::default()
        };
        assert!(HttpClassifier::from_config(&cfg).is_ok());
    }
}
