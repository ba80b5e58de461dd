//! # Stats Engine
//! Per-site and per-period label statistics over scored articles.
//!
//! Stateless: every call recomputes from the rows it is given. Ranking uses
//! exact integer comparisons, so two sites with equal toxic shares always tie
//! and fall back to alphabetical order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::{LabelCounts, LabelProportions, ScoredArticle, TimeWindow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStat {
    pub site: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub article_count: usize,
    pub label_counts: LabelCounts,
    pub proportion_by_label: LabelProportions,
    /// `slightly_toxic + very_toxic` share.
    pub toxic_proportion: f64,
    /// 1-based; 1 = most toxic.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStat {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub article_count: usize,
    pub label_counts: LabelCounts,
    pub proportion_by_label: LabelProportions,
    pub toxic_proportion: f64,
}

/// Calendar bucket for [`compute_period_stats`]. Weeks are ISO weeks (Monday start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodBucket {
    #[default]
    Day,
    Week,
    Month,
}

impl PeriodBucket {
    /// `[start, end)` of the bucket holding `ts`.
    pub fn bounds(self, ts: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let day = ts.date_naive();
        let (start, end) = match self {
            PeriodBucket::Day => (day, day.succ_opt()?),
            PeriodBucket::Week => {
                let start = day - Duration::days(day.weekday().num_days_from_monday() as i64);
                (start, start + Duration::days(7))
            }
            PeriodBucket::Month => {
                let start = NaiveDate::from_ymd_opt(day.year(), day.month(), 1)?;
                let end = if day.month() == 12 {
                    NaiveDate::from_ymd_opt(day.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(day.year(), day.month() + 1, 1)?
                };
                (start, end)
            }
        };
        Some((midnight(start), midnight(end)))
    }
}

fn midnight(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Debug, Default)]
struct Tally {
    counts: LabelCounts,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
}

impl Tally {
    fn add(&mut self, row: &ScoredArticle) {
        self.counts.increment(row.dominant_label);
        self.first = Some(self.first.map_or(row.published_at, |f| f.min(row.published_at)));
        self.last = Some(self.last.map_or(row.published_at, |l| l.max(row.published_at)));
    }
}

fn check_window(window: &TimeWindow) -> Result<()> {
    if window.is_valid() {
        Ok(())
    } else {
        Err(PipelineError::config("period_start must not be after period_end"))
    }
}

/// All sites with at least one article in `window`, ranked most toxic first.
pub fn compute_site_stats(records: &[ScoredArticle], window: &TimeWindow) -> Result<Vec<SiteStat>> {
    compute_site_stats_filtered(records, None, window)
}

/// Like [`compute_site_stats`], restricted to one site when `site` is set.
pub fn compute_site_stats_filtered(
    records: &[ScoredArticle],
    site: Option<&str>,
    window: &TimeWindow,
) -> Result<Vec<SiteStat>> {
    check_window(window)?;

    let mut by_site: BTreeMap<&str, Tally> = BTreeMap::new();
    for row in records {
        if site.is_some_and(|s| s != row.site) || !window.contains(row.published_at) {
            continue;
        }
        by_site.entry(row.site.as_str()).or_default().add(row);
    }

    let mut stats: Vec<SiteStat> = by_site
        .into_iter()
        .filter_map(|(site, t)| {
            let proportion_by_label = LabelProportions::from_counts(&t.counts)?;
            Some(SiteStat {
                site: site.to_string(),
                period_start: window.start.or(t.first)?,
                period_end: window.end.or(t.last)?,
                article_count: t.counts.total(),
                label_counts: t.counts,
                toxic_proportion: proportion_by_label.slightly_toxic
                    + proportion_by_label.very_toxic,
                proportion_by_label,
                rank: 0,
            })
        })
        .collect();

    stats.sort_by(rank_order);
    for (i, s) in stats.iter_mut().enumerate() {
        s.rank = i + 1;
    }
    Ok(stats)
}

/// Higher toxic share first (`a.toxic / a.n` vs `b.toxic / b.n` cross-multiplied),
/// then site name ascending.
fn rank_order(a: &SiteStat, b: &SiteStat) -> Ordering {
    let lhs = a.label_counts.toxic() as u128 * b.article_count as u128;
    let rhs = b.label_counts.toxic() as u128 * a.article_count as u128;
    rhs.cmp(&lhs).then_with(|| a.site.cmp(&b.site))
}

/// Rank-1 site in `window`, if any site has articles there.
pub fn most_toxic_site(records: &[ScoredArticle], window: &TimeWindow) -> Result<Option<SiteStat>> {
    Ok(compute_site_stats(records, window)?.into_iter().next())
}

/// Chronological series of calendar buckets; buckets without articles are omitted.
pub fn compute_period_stats(
    records: &[ScoredArticle],
    bucket: PeriodBucket,
    site: Option<&str>,
) -> Vec<PeriodStat> {
    let mut by_period: BTreeMap<(DateTime<Utc>, DateTime<Utc>), LabelCounts> = BTreeMap::new();
    for row in records {
        if site.is_some_and(|s| s != row.site) {
            continue;
        }
        if let Some(bounds) = bucket.bounds(row.published_at) {
            by_period.entry(bounds).or_default().increment(row.dominant_label);
        }
    }

    by_period
        .into_iter()
        .filter_map(|((period_start, period_end), counts)| {
            let proportion_by_label = LabelProportions::from_counts(&counts)?;
            Some(PeriodStat {
                period_start,
                period_end,
                article_count: counts.total(),
                label_counts: counts,
                toxic_proportion: proportion_by_label.slightly_toxic + proportion_by_label.very_toxic,
                proportion_by_label,
            })
        })
        .collect()
}

/// Plain-text table for terminals.
pub fn render_site_table(stats: &[SiteStat]) -> String {
    let width = stats
        .iter()
        .map(|s| s.site.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:<width$}  {:>8}  {:>9}  {:>9}  {:>9}  {:>7}",
        "rank", "site", "articles", "non_toxic", "slightly", "very", "toxic%"
    );
    for s in stats {
        let _ = writeln!(
            out,
            "{:>4}  {:<width$}  {:>8}  {:>9}  {:>9}  {:>9}  {:>6.1}%",
            s.rank,
            s.site,
            s.article_count,
            s.label_counts.non_toxic,
            s.label_counts.slightly_toxic,
            s.label_counts.very_toxic,
            s.toxic_proportion * 100.0
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn row(id: usize, site: &str, day: u32, label: Label) -> ScoredArticle {
        ScoredArticle {
            article_id: format!("{site}-{id}"),
            site: site.to_string(),
            published_at: ts(&format!("2025-01-{day:02}T10:00:00Z")),
            dominant_label: label,
        }
    }

    fn corpus() -> Vec<ScoredArticle> {
        let mut rows = Vec::new();
        for i in 0..10 {
            let l = if i < 3 { Label::VeryToxic } else { Label::NonToxic };
            rows.push(row(i, "site-a", 1 + i as u32, l));
        }
        for i in 0..5 {
            let l = if i == 0 { Label::SlightlyToxic } else { Label::NonToxic };
            rows.push(row(i, "site-b", 1 + i as u32, l));
        }
        rows
    }

    #[test]
    fn ranks_by_toxic_share() {
        let stats = compute_site_stats(&corpus(), &TimeWindow::default()).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].site, "site-a");
        assert_eq!(stats[0].rank, 1);
        assert!((stats[0].toxic_proportion - 0.3).abs() < 1e-12);
        assert_eq!(stats[1].site, "site-b");
        assert!((stats[1].toxic_proportion - 0.2).abs() < 1e-12);
        assert_eq!(stats[0].period_start, ts("2025-01-01T10:00:00Z"));
        assert_eq!(stats[0].period_end, ts("2025-01-10T10:00:00Z"));
    }

    #[test]
    fn proportions_sum_to_one() {
        for s in compute_site_stats(&corpus(), &TimeWindow::default()).unwrap() {
            assert!((s.proportion_by_label.sum() - 1.0).abs() < 1e-9);
            assert_eq!(s.label_counts.total(), s.article_count);
        }
    }

    #[test]
    fn ties_break_by_site_name() {
        let rows = vec![
            row(0, "zeta", 1, Label::VeryToxic),
            row(1, "zeta", 2, Label::NonToxic),
            row(0, "alpha", 1, Label::SlightlyToxic),
            row(1, "alpha", 2, Label::NonToxic),
            row(2, "alpha", 3, Label::VeryToxic),
            row(3, "alpha", 4, Label::NonToxic),
        ];
        let stats = compute_site_stats(&rows, &TimeWindow::default()).unwrap();
        let order: Vec<&str> = stats.iter().map(|s| s.site.as_str()).collect();
        assert_eq!(order, vec!["alpha", "zeta"]);
        // Ranking is stable across input order.
        let mut reversed = rows.clone();
        reversed.reverse();
        assert_eq!(compute_site_stats(&reversed, &TimeWindow::default()).unwrap(), stats);
    }

    #[test]
    fn window_filters_and_omits_empty_sites() {
        let w = TimeWindow::new(Some(ts("2025-01-06T00:00:00Z")), Some(ts("2025-01-11T00:00:00Z")));
        let stats = compute_site_stats(&corpus(), &w).unwrap();
        assert_eq!(stats.len(), 1, "site-b has nothing after the 5th");
        assert_eq!(stats[0].article_count, 5);
        assert_eq!(stats[0].label_counts.toxic(), 0);
        assert_eq!(stats[0].period_start, ts("2025-01-06T00:00:00Z"));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let w = TimeWindow::new(Some(ts("2025-02-01T00:00:00Z")), Some(ts("2025-01-01T00:00:00Z")));
        let err = compute_site_stats(&corpus(), &w).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[test]
    fn empty_corpus_gives_empty_stats() {
        assert!(compute_site_stats(&[], &TimeWindow::default()).unwrap().is_empty());
        assert!(most_toxic_site(&[], &TimeWindow::default()).unwrap().is_none());
    }

    #[test]
    fn filtered_by_site() {
        let stats =
            compute_site_stats_filtered(&corpus(), Some("site-b"), &TimeWindow::default()).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].rank, 1);
        assert_eq!(stats[0].label_counts.slightly_toxic, 1);
    }

    #[test]
    fn weekly_buckets_are_chronological() {
        // 2025-01-01 is a Wednesday: days 1..=5 fall in ISO week 1, 6..=10 in week 2.
        let series = compute_period_stats(&corpus(), PeriodBucket::Week, Some("site-a"));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].period_start, ts("2024-12-30T00:00:00Z"));
        assert_eq!(series[0].article_count, 5);
        assert_eq!(series[0].label_counts.very_toxic, 3);
        assert_eq!(series[1].period_start, ts("2025-01-06T00:00:00Z"));
        assert_eq!(series[1].period_end, ts("2025-01-13T00:00:00Z"));
        assert!(series[0].period_start < series[1].period_start);
    }

    #[test]
    fn month_bucket_wraps_year() {
        let (s, e) = PeriodBucket::Month.bounds(ts("2024-12-15T08:00:00Z")).unwrap();
        assert_eq!(s, ts("2024-12-01T00:00:00Z"));
        assert_eq!(e, ts("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn table_lists_every_site() {
        let stats = compute_site_stats(&corpus(), &TimeWindow::default()).unwrap();
        let table = render_site_table(&stats);
        assert!(table.lines().count() == 3);
        assert!(table.contains("site-a"));
        assert!(table.contains("30.0%"));
    }
}
