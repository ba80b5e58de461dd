// tests/pipeline_scenarios.rs
//
// End-to-end behaviour of the scoring pipeline through `ToxicityService`,
// with a scripted classifier so every verdict is deterministic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use toxic_news::classifier::{Script, ScriptedClassifier};
use toxic_news::config::PipelineConfig;
use toxic_news::storage::MemoryStore;
use toxic_news::types::{Article, Label, LabelDistribution};
use toxic_news::{PipelineError, StatsQuery, ToxicityService};

fn cfg(max_segment_length: usize) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.segmenter.max_segment_length = max_segment_length;
    cfg.orchestrator.initial_backoff_ms = 1;
    cfg.orchestrator.max_backoff_ms = 5;
    cfg.orchestrator.jitter = false;
    cfg
}

fn service(mock: Arc<ScriptedClassifier>, cfg: &PipelineConfig) -> ToxicityService {
    ToxicityService::new(cfg, mock, Arc::new(MemoryStore::new())).expect("valid pipeline")
}

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("timestamp")
}

#[tokio::test]
async fn calm_text_is_non_toxic() {
    let mock = Arc::new(ScriptedClassifier::new(LabelDistribution::new(0.45, 0.3, 0.25)));
    let svc = service(mock, &cfg(1000));

    let p = svc
        .predict("Le conseil municipal a voté le budget. La séance a duré deux heures.")
        .await
        .expect("prediction");
    assert_eq!(p.dominant_label, Label::NonToxic);
    assert!(!p.is_toxic);
    assert_eq!(p.degraded_count, 0);
}

#[tokio::test]
async fn one_very_toxic_segment_flags_the_article() {
    let mock = Arc::new(
        ScriptedClassifier::neutral()
            .on("venom", Script::Fixed(LabelDistribution::new(0.05, 0.05, 0.9))),
    );
    let svc = service(mock.clone(), &cfg(40));

    let p = svc
        .predict("First part is calm. Second has venom in it. Third is calm too.")
        .await
        .expect("prediction");
    assert_eq!(p.segment_count, 3);
    assert_eq!(p.dominant_label, Label::VeryToxic);
    assert!((p.aggregate_score - 0.9).abs() < 1e-6);
    assert_eq!(p.label_counts.very_toxic, 1);
    assert_eq!(p.label_counts.non_toxic, 2);
}

#[tokio::test]
async fn all_segments_failing_is_insufficient_data() {
    let mock = Arc::new(ScriptedClassifier::neutral().on("BAD", Script::FailPermanent));
    let svc = service(mock.clone(), &cfg(20));

    let err = svc
        .predict("First BAD part. Second BAD part. Third BAD part.")
        .await
        .expect_err("every segment fails");
    assert!(matches!(err, PipelineError::InsufficientData(_)));
    assert_eq!(err.kind(), "InsufficientDataError");
    // One batch call, then each segment on its own; permanent failures are not retried.
    assert_eq!(mock.calls(), 4);
}

#[tokio::test]
async fn partial_failure_still_yields_a_verdict() {
    let mock = Arc::new(
        ScriptedClassifier::neutral()
            .on("BAD", Script::FailPermanent)
            .on("flaky", Script::FailTransient {
                times: 1,
                then: LabelDistribution::new(0.2, 0.7, 0.1),
            }),
    );
    let svc = service(mock, &cfg(40));

    let p = svc
        .predict("A BAD sentence goes first. Then a flaky one follows. Calm end.")
        .await
        .expect("prediction");
    assert_eq!(p.degraded_count, 1);
    assert_eq!(p.dominant_label, Label::SlightlyToxic);
    assert!((p.aggregate_score - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn invalid_config_is_rejected_before_any_call() {
    let mock = Arc::new(ScriptedClassifier::neutral());
    let mut bad = cfg(1000);
    bad.aggregator.threshold = 2.0;
    let err = ToxicityService::new(&bad, mock.clone(), Arc::new(MemoryStore::new()))
        .err()
        .expect("threshold out of range");
    assert_eq!(err.kind(), "ConfigurationError");
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn site_ranking_over_scored_articles() {
    let mock = Arc::new(
        ScriptedClassifier::neutral()
            .on("[very]", Script::Fixed(LabelDistribution::new(0.05, 0.1, 0.85)))
            .on("[slightly]", Script::Fixed(LabelDistribution::new(0.2, 0.7, 0.1))),
    );
    let svc = service(mock, &cfg(1000));

    let mut n = 0;
    let mut add = |site: &str, marker: &str| {
        n += 1;
        Article::new(
            format!("{site}-{n}"),
            format!("https://{site}/{n}"),
            site,
            ts("2025-01-15T12:00:00Z"),
            format!("Article {n} {marker}."),
        )
    };
    let mut articles = Vec::new();
    for i in 0..10 {
        articles.push(add("site-a", if i < 3 { "[very]" } else { "calm" }));
    }
    for i in 0..5 {
        articles.push(add("site-b", if i == 0 { "[slightly]" } else { "calm" }));
    }
    for a in &articles {
        svc.score_article(a).await.expect("scored");
    }

    let stats = svc.get_stats(&StatsQuery::default()).await.expect("stats");
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].site, "site-a");
    assert_eq!(stats[0].rank, 1);
    assert!((stats[0].toxic_proportion - 0.3).abs() < 1e-9);
    assert_eq!(stats[1].site, "site-b");
    assert!((stats[1].toxic_proportion - 0.2).abs() < 1e-9);

    let top = svc
        .most_toxic_site(&StatsQuery::default())
        .await
        .expect("stats")
        .expect("some site");
    assert_eq!(top.site, "site-a");

    // Window that excludes everything → empty, not an error.
    let q = StatsQuery {
        site: None,
        period_start: Some(ts("2025-02-01T00:00:00Z")),
        period_end: None,
    };
    assert!(svc.get_stats(&q).await.expect("stats").is_empty());
}

#[tokio::test]
async fn rescoring_overwrites_previous_verdict() {
    let mock = Arc::new(
        ScriptedClassifier::neutral()
            .on("insulte", Script::Fixed(LabelDistribution::new(0.1, 0.1, 0.8))),
    );
    let svc = service(mock, &cfg(1000));
    let at = ts("2025-01-10T08:00:00Z");

    let calm = Article::new("a1", "https://x.fr/a1", "x.fr", at, "Un texte calme.");
    svc.score_article(&calm).await.expect("scored");
    let edited = Article::new("a1", "https://x.fr/a1", "x.fr", at, "Une insulte.");
    svc.score_article(&edited).await.expect("scored");

    let stats = svc.get_stats(&StatsQuery::default()).await.expect("stats");
    assert_eq!(stats[0].article_count, 1);
    assert_eq!(stats[0].label_counts.very_toxic, 1);
}
