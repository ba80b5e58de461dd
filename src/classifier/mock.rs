//! Deterministic scripted classifier for tests and local runs.
//!
//! Rules are matched by substring, first match wins; unmatched text gets the
//! default distribution. Call counts are tracked so tests can assert on retries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::SegmentClassifier;
use crate::error::ClassifierError;
use crate::types::LabelDistribution;

/// Behaviour for texts matching a rule.
#[derive(Debug, Clone)]
pub enum Script {
    /// Always answer with this distribution.
    Fixed(LabelDistribution),
    /// Fail transiently `times` times per distinct text, then answer.
    FailTransient {
        times: usize,
        then: LabelDistribution,
    },
    /// Always fail permanently.
    FailPermanent,
    /// Always fail transiently.
    AlwaysTransient,
    /// Sleep before answering (exercises call timeouts and cancellation).
    Delay(Duration, LabelDistribution),
}

pub struct ScriptedClassifier {
    rules: Vec<(String, Script)>,
    default: LabelDistribution,
    reachable: bool,
    probe_delay: Option<Duration>,
    calls: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
}

impl ScriptedClassifier {
    pub fn new(default: LabelDistribution) -> Self {
        Self {
            rules: Vec::new(),
            default,
            reachable: true,
            probe_delay: None,
            calls: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Everything is clearly benign unless a rule says otherwise.
    pub fn neutral() -> Self {
        Self::new(LabelDistribution::new(0.9, 0.07, 0.03))
    }

    pub fn on(mut self, needle: impl Into<String>, script: Script) -> Self {
        self.rules.push((needle.into(), script));
        self
    }

    /// Make `probe()` fail, as if the backend were down.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Make `probe()` sleep first, as if the backend accepted the connection
    /// but never answered.
    pub fn slow_probe(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    /// Number of `classify` invocations so far (retries included).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn bump_attempt(&self, text: &str) -> usize {
        let mut g = self.attempts.lock().unwrap_or_else(|p| p.into_inner());
        let n = g.entry(text.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

#[async_trait]
impl SegmentClassifier for ScriptedClassifier {
    async fn classify(&self, text: &str) -> Result<LabelDistribution, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, s)| s.clone());

        match script {
            None => Ok(self.default),
            Some(Script::Fixed(d)) => Ok(d),
            Some(Script::FailTransient { times, then }) => {
                if self.bump_attempt(text) <= times {
                    Err(ClassifierError::Transient("scripted transient failure".into()))
                } else {
                    Ok(then)
                }
            }
            Some(Script::FailPermanent) => Err(ClassifierError::Permanent(
                "scripted permanent failure".into(),
            )),
            Some(Script::AlwaysTransient) => Err(ClassifierError::Transient(
                "scripted transient failure".into(),
            )),
            Some(Script::Delay(d, dist)) => {
                tokio::time::sleep(d).await;
                Ok(dist)
            }
        }
    }

    async fn probe(&self) -> Result<(), ClassifierError> {
        if let Some(d) = self.probe_delay {
            tokio::time::sleep(d).await;
        }
        if self.reachable {
            Ok(())
        } else {
            Err(ClassifierError::Transient("backend unreachable".into()))
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "scripted-mock"
    }
}
