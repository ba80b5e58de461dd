// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::ArticleSource;
use crate::service::ToxicityService;
use crate::types::LabelCounts;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_articles_total", "Articles parsed from sources.");
        describe_counter!("ingest_scored_total", "Articles scored and persisted.");
        describe_counter!(
            "ingest_skipped_total",
            "Articles skipped because their text was empty."
        );
        describe_counter!(
            "ingest_failed_total",
            "Articles whose scoring or persistence failed."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Source fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Source parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Normalize article text: decode entities, drop markup, collapse spaces.
/// Paragraph breaks survive as blank lines so the segmenter can split on them.
pub fn normalize_text(s: &str) -> String {
    use regex::{Captures, Regex};

    static RE_BLOCK: OnceCell<Option<Regex>> = OnceCell::new();
    static RE_TAGS: OnceCell<Option<Regex>> = OnceCell::new();
    static RE_SPACES: OnceCell<Option<Regex>> = OnceCell::new();
    static RE_LINES: OnceCell<Option<Regex>> = OnceCell::new();

    fn line_break(c: &Captures<'_>) -> &'static str {
        if c[0].matches('\n').count() > 1 {
            "\n\n"
        } else {
            "\n"
        }
    }

    fn re(cell: &'static OnceCell<Option<Regex>>, pat: &str) -> Option<&'static Regex> {
        cell.get_or_init(|| Regex::new(pat).ok()).as_ref()
    }

    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Block-level tags become paragraph breaks, the rest is stripped
    if let Some(r) = re(&RE_BLOCK, r"(?i)</p\s*>|<br\s*/?>|</div\s*>|</h[1-6]\s*>|</li\s*>") {
        out = r.replace_all(&out, "\n\n").into_owned();
    }
    if let Some(r) = re(&RE_TAGS, r"(?s)</?[^>]+>") {
        out = r.replace_all(&out, "").into_owned();
    }

    // 3) Collapse horizontal whitespace, then runs of newlines
    if let Some(r) = re(&RE_SPACES, r"[^\S\n]+") {
        out = r.replace_all(&out, " ").into_owned();
    }
    if let Some(r) = re(&RE_LINES, r" ?\n[\n ]*") {
        out = r.replace_all(&out, line_break).into_owned();
    }

    out.trim().to_string()
}

/// Stable article id derived from its URL (first 16 hex chars of SHA-256).
pub fn article_id_for(url: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;
    let digest = Sha256::digest(url.trim().as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub processed: usize,
    pub scored: usize,
    pub skipped_empty: usize,
    pub failed: usize,
    pub source_errors: usize,
    /// Verdicts of the articles scored in this pass.
    pub labels: LabelCounts,
}

/// Fetch from every source, then score and persist each non-empty article.
/// A failing source or article is logged and counted; the pass goes on.
pub async fn run_once(sources: &[Box<dyn ArticleSource>], service: &ToxicityService) -> IngestSummary {
    ensure_metrics_described();
    let mut summary = IngestSummary::default();

    for src in sources {
        let articles = match src.fetch_new_articles().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = ?e, source = src.name(), "source error");
                counter!("ingest_source_errors_total").increment(1);
                summary.source_errors += 1;
                continue;
            }
        };

        for article in articles {
            summary.processed += 1;
            if article.text.trim().is_empty() {
                summary.skipped_empty += 1;
                continue;
            }
            match service.score_article(&article).await {
                Ok(score) => {
                    summary.scored += 1;
                    summary.labels.increment(score.dominant_label);
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        article_id = %article.id,
                        site = %article.site,
                        kind = e.kind(),
                        error = %e,
                        "article not scored"
                    );
                }
            }
        }
    }

    let now = chrono::Utc::now().timestamp().max(0) as u64;
    counter!("ingest_scored_total").increment(summary.scored as u64);
    counter!("ingest_skipped_total").increment(summary.skipped_empty as u64);
    counter!("ingest_failed_total").increment(summary.failed as u64);
    gauge!("ingest_pipeline_last_run_ts").set(now as f64);

    tracing::info!(
        target: "ingest",
        processed = summary.processed,
        scored = summary.scored,
        skipped = summary.skipped_empty,
        failed = summary.failed,
        source_errors = summary.source_errors,
        "ingest pass finished"
    );
    summary
}
