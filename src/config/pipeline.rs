// src/config/pipeline.rs
//! Pipeline policy: segment sizing, classifier orchestration, aggregation rule.
//!
//! TOML shape (every key optional):
//! ```toml
//! [segmenter]
//! max_segment_length = 1000
//! overlap = 0
//! unit = "chars"            # or "words"
//!
//! [orchestrator]
//! batch_size = 8
//! max_retries = 2
//! initial_backoff_ms = 200
//! backoff_multiplier = 2.0
//! max_backoff_ms = 5000
//! jitter = true
//! call_timeout_ms = 10000
//! max_concurrent_batches = 4
//!
//! [aggregator]
//! threshold = 0.5
//! rule = "severity_escalation"   # or "mean"
//!
//! [classifier]
//! provider = "lexicon"           # "http" | "lexicon" | "mock"
//! endpoint = "http://127.0.0.1:8090/classify"
//! ```

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::classifier::ClassifierConfig;
use crate::error::PipelineError;
use crate::retry::RetryPolicy;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_ARTICLE_THRESHOLD: &str = "TOXIC_ARTICLE_THRESHOLD";
pub const ENV_MAX_SEGMENT_LENGTH: &str = "TOXIC_MAX_SEGMENT_LENGTH";

/// Unit in which `max_segment_length` and `overlap` are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentUnit {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// Whitespace-delimited words.
    Words,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub max_segment_length: usize,
    pub overlap: usize,
    pub unit: SegmentUnit,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_segment_length: 1000,
            overlap: 0,
            unit: SegmentUnit::Chars,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_segment_length == 0 {
            return Err(PipelineError::config(
                "max_segment_length must be a positive integer",
            ));
        }
        if self.overlap >= self.max_segment_length {
            return Err(PipelineError::config(format!(
                "overlap ({}) must be smaller than max_segment_length ({})",
                self.overlap, self.max_segment_length
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
    /// Per classifier call; independent of the retry budget.
    pub call_timeout_ms: u64,
    pub max_concurrent_batches: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            max_retries: 2,
            initial_backoff_ms: 200,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
            jitter: true,
            call_timeout_ms: 10_000,
            max_concurrent_batches: 4,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be at least 1"));
        }
        if self.max_concurrent_batches == 0 {
            return Err(PipelineError::config(
                "max_concurrent_batches must be at least 1",
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(PipelineError::config("call_timeout_ms must be positive"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PipelineError::config("backoff_multiplier must be >= 1.0"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_backoff_ms),
            jitter: self.jitter,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// How per-segment distributions are combined into the article verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationRule {
    /// Most severe label any single segment carries above the threshold.
    #[default]
    SeverityEscalation,
    /// Same selection, applied to the mean distribution over segments.
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub threshold: f32,
    pub rule: CombinationRule,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            rule: CombinationRule::SeverityEscalation,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Full policy for one pipeline instance. Passed explicitly into constructors,
/// so pipelines with different policies can run side by side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub segmenter: SegmenterConfig,
    pub orchestrator: OrchestratorConfig,
    pub aggregator: AggregatorConfig,
    pub classifier: ClassifierConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Load using env var + fallbacks, then apply env overrides and validate:
    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> anyhow::Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_PIPELINE_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            Self::load_from_file(&pb)?
        } else {
            let default_path = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from_file(&default_path)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), PipelineError> {
        if let Ok(raw) = std::env::var(ENV_ARTICLE_THRESHOLD) {
            self.aggregator.threshold = raw.trim().parse::<f32>().map_err(|_| {
                PipelineError::config(format!("{ENV_ARTICLE_THRESHOLD} is not a number: {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var(ENV_MAX_SEGMENT_LENGTH) {
            self.segmenter.max_segment_length = raw.trim().parse::<usize>().map_err(|_| {
                PipelineError::config(format!(
                    "{ENV_MAX_SEGMENT_LENGTH} is not a positive integer: {raw}"
                ))
            })?;
        }
        self.classifier.apply_env_overrides();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.segmenter.validate()?;
        self.orchestrator.validate()?;
        self.aggregator.validate()?;
        self.classifier.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierProvider;
    use std::env;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
[segmenter]
max_segment_length = 40
unit = "words"

[aggregator]
threshold = 0.7
rule = "mean"
"#,
        )
        .unwrap();
        assert_eq!(cfg.segmenter.max_segment_length, 40);
        assert_eq!(cfg.segmenter.unit, SegmentUnit::Words);
        assert_eq!(cfg.segmenter.overlap, 0);
        assert_eq!(cfg.orchestrator.max_retries, 2);
        assert_eq!(cfg.aggregator.rule, CombinationRule::Mean);
        assert_eq!(cfg.classifier.provider, ClassifierProvider::Lexicon);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let mut cfg = PipelineConfig::default();
        cfg.segmenter.max_segment_length = 0;
        assert_eq!(cfg.validate().unwrap_err().kind(), "ConfigurationError");

        let mut cfg = PipelineConfig::default();
        cfg.segmenter.overlap = cfg.segmenter.max_segment_length;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.aggregator.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.classifier.provider = ClassifierProvider::Http;
        assert!(cfg.validate().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_PIPELINE_CONFIG_PATH);
        env::remove_var(ENV_ARTICLE_THRESHOLD);

        // No files → defaults
        let cfg = PipelineConfig::load_default().unwrap();
        assert_eq!(cfg.segmenter.max_segment_length, 1000);

        // Env path wins, env threshold overrides the file
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[aggregator]\nthreshold = 0.8\n").unwrap();
        env::set_var(ENV_PIPELINE_CONFIG_PATH, p.display().to_string());
        let cfg = PipelineConfig::load_default().unwrap();
        assert!((cfg.aggregator.threshold - 0.8).abs() < f32::EPSILON);

        env::set_var(ENV_ARTICLE_THRESHOLD, "0.25");
        let cfg = PipelineConfig::load_default().unwrap();
        assert!((cfg.aggregator.threshold - 0.25).abs() < f32::EPSILON);

        env::set_var(ENV_ARTICLE_THRESHOLD, "loud");
        assert!(PipelineConfig::load_default().is_err());

        env::remove_var(ENV_ARTICLE_THRESHOLD);
        env::remove_var(ENV_PIPELINE_CONFIG_PATH);
        env::set_current_dir(&old).unwrap();
    }
}
