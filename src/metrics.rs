use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. A process has one global recorder, so
    /// later calls reuse the first handle.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                // Use default buckets to avoid API differences across crate versions.
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")
            })?
            .clone();
        describe_pipeline_metrics();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_pipeline_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "classifier_calls_total",
            "Classifier calls, retries included."
        );
        describe_counter!(
            "classifier_retries_total",
            "Classifier calls repeated after a transient failure."
        );
        describe_counter!(
            "segments_degraded_total",
            "Segments left unclassified after retries."
        );
        describe_histogram!(
            "classify_batch_ms",
            "Classifier call latency in milliseconds."
        );
        describe_counter!(
            "predict_requests_total",
            "On-demand predictions by outcome."
        );
    });
}
