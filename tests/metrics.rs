// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use toxic_news::classifier::{Script, ScriptedClassifier};
use toxic_news::config::PipelineConfig;
use toxic_news::metrics::Metrics;
use toxic_news::storage::MemoryStore;
use toxic_news::types::LabelDistribution;
use toxic_news::ToxicityService;

#[tokio::test]
async fn metrics_endpoint_contains_pipeline_series() {
    let metrics = Metrics::init().expect("recorder");
    // Second init reuses the installed recorder.
    let again = Metrics::init().expect("recorder reused");

    let mut cfg = PipelineConfig::default();
    cfg.orchestrator.initial_backoff_ms = 1;
    cfg.orchestrator.jitter = false;
    let mock = ScriptedClassifier::neutral()
        .on("flaky", Script::FailTransient {
            times: 1,
            then: LabelDistribution::new(0.9, 0.05, 0.05),
        })
        .on("BROKEN", Script::FailPermanent);
    let svc = ToxicityService::new(&cfg, Arc::new(mock), Arc::new(MemoryStore::new()))
        .expect("service");

    svc.predict("Un texte parfaitement calme.").await.expect("ok");
    let _ = svc.predict("Un texte flaky.").await;
    let _ = svc.predict("BROKEN").await;

    let app = toxic_news::router(Arc::new(svc)).merge(metrics.router());
    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .expect("build GET /metrics");
    let resp = app.oneshot(req).await.expect("GET /metrics");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");

    for series in [
        "classifier_calls_total",
        "classifier_retries_total",
        "segments_degraded_total",
        "predict_requests_total",
        "classify_batch_ms",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains(r#"outcome="InsufficientDataError""#));
    assert!(!again.handle.render().is_empty());
}
