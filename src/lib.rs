// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod aggregate;
pub mod api;
pub mod chart;
pub mod classifier;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod segmenter;
pub mod service;
pub mod stats;
pub mod storage;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::error::{ClassifierError, PipelineError, StorageError};
pub use crate::service::{Prediction, StatsQuery, ToxicityService};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber: `RUST_LOG` filter (default
/// `toxic_news=info,warn`), compact output or JSON with `LOG_FORMAT=json`.
/// A no-op when a subscriber is already installed (e.g. by the Shuttle runtime).
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toxic_news=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
