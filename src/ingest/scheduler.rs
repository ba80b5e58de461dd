// src/ingest/scheduler.rs
use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ingest::types::ArticleSource;
use crate::service::ToxicityService;

#[derive(Clone, Copy, Debug)]
pub struct IngestSchedulerCfg {
    pub interval_secs: u64,
}

/// Spawn a background task running [`crate::ingest::run_once`] every
/// `interval_secs` (first pass immediately) until `shutdown` fires.
pub fn spawn_scheduler(
    cfg: IngestSchedulerCfg,
    sources: Vec<Box<dyn ArticleSource>>,
    service: Arc<ToxicityService>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(cfg.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "ingest", "scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let summary = crate::ingest::run_once(&sources, &service).await;
                    counter!("ingest_runs_total").increment(1);
                    tracing::debug!(target: "ingest", ?summary, "scheduled ingest tick");
                }
            }
        }
    })
}
