//! Error taxonomy for the scoring pipeline.
//!
//! - [`PipelineError`] is what callers of the service see. Its [`kind`](PipelineError::kind)
//!   is the stable name surfaced to API clients next to a human-readable reason.
//! - [`ClassifierError`] never leaves the orchestrator: it is retried or turned
//!   into a degraded segment.
//! - [`StorageError`] comes from the persistence side and is propagated unchanged.

use thiserror::Error;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration or request parameters, rejected before any classifier call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Nothing usable to aggregate (no segments, or every segment degraded).
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The caller cancelled the request while classifier calls were in flight.
    #[error("request cancelled")]
    Cancelled,

    #[error("render error: {0}")]
    Render(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    /// Taxonomy name shown to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "ConfigurationError",
            PipelineError::InsufficientData(_) => "InsufficientDataError",
            PipelineError::Storage(_) => "StorageError",
            PipelineError::Cancelled => "Cancelled",
            PipelineError::Render(_) => "RenderError",
        }
    }
}

/// Failure signalled by a classifier backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// Timeouts, overloaded backends, dropped connections. Worth retrying.
    #[error("transient classifier failure: {0}")]
    Transient(String),

    /// Malformed input or a misconfigured backend. Retrying will not help.
    #[error("permanent classifier failure: {0}")]
    Permanent(String),
}

impl ClassifierError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifierError::Transient(_) => "ClassifierTransientError",
            ClassifierError::Permanent(_) => "ClassifierPermanentError",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(PipelineError::config("x").kind(), "ConfigurationError");
        assert_eq!(
            PipelineError::InsufficientData("x".into()).kind(),
            "InsufficientDataError"
        );
        let e: PipelineError = StorageError::Backend("down".into()).into();
        assert_eq!(e.kind(), "StorageError");
        assert_eq!(e.to_string(), "storage error: down");
        assert_eq!(
            ClassifierError::Permanent("bad".into()).kind(),
            "ClassifierPermanentError"
        );
    }
}
