//! # Segmenter
//! Splits article text into segments no longer than the classifier's input limit.
//!
//! Policy:
//! - Greedy packing: each segment takes as many units as fit, ending on the last
//!   sentence/paragraph boundary inside the limit.
//! - A sentence longer than the limit is hard-cut at the limit.
//! - `overlap` trailing units of a segment are repeated at the head of the next.
//!
//! Boundary rules are fixed regexes (no locale-dependent splitting), so the same
//! text and config always yield the same segments.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::config::{SegmentUnit, SegmenterConfig};
use crate::error::Result;
use crate::types::Segment;

fn re(cell: &'static OnceCell<Option<Regex>>, pat: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pat).ok()).as_ref()
}

/// Sentence end (`.`, `!`, `?`, `…`, optional closing quote/bracket, then
/// whitespace) or a blank line, LF or CRLF.
fn sentence_break_re() -> Option<&'static Regex> {
    static RE: OnceCell<Option<Regex>> = OnceCell::new();
    re(&RE, r#"[.!?…]+["'”’»)\]]*\s+|\r?\n[ \t]*\r?\n\s*"#)
}

fn word_re() -> Option<&'static Regex> {
    static RE: OnceCell<Option<Regex>> = OnceCell::new();
    re(&RE, r"\S+")
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    cfg: SegmenterConfig,
}

impl Segmenter {
    /// Rejects a zero limit or an overlap that would stall the split.
    pub fn new(cfg: SegmenterConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.cfg
    }

    /// Segment `text`, tagging every segment with `article_id`.
    pub fn segment(&self, article_id: &str, text: &str) -> Vec<Segment> {
        let units = unit_spans(text, self.cfg.unit);
        if units.is_empty() {
            return Vec::new();
        }
        let boundaries = sentence_boundaries(text, &units);
        let ranges = pack(
            units.len(),
            &boundaries,
            self.cfg.max_segment_length,
            self.cfg.overlap,
        );

        let mut out = Vec::with_capacity(ranges.len());
        for (first, last) in ranges {
            let start = units[first].0;
            let end = units[last - 1].1;
            let slice = &text[start..end];
            let start = start + (slice.len() - slice.trim_start().len());
            let end = start + text[start..end].trim_end().len();
            if start >= end {
                continue;
            }
            out.push(Segment {
                article_id: article_id.to_string(),
                index: out.len(),
                text: text[start..end].to_string(),
                start_offset: start,
                end_offset: end,
            });
        }
        out
    }
}

/// Contract form: char units, no article id.
pub fn segment(text: &str, max_segment_length: usize, overlap: usize) -> Result<Vec<Segment>> {
    let segmenter = Segmenter::new(SegmenterConfig {
        max_segment_length,
        overlap,
        unit: SegmentUnit::Chars,
    })?;
    Ok(segmenter.segment("", text))
}

/// Byte spans of the measuring units.
fn unit_spans(text: &str, unit: SegmentUnit) -> Vec<(usize, usize)> {
    match unit {
        SegmentUnit::Chars => text
            .char_indices()
            .map(|(i, c)| (i, i + c.len_utf8()))
            .collect(),
        SegmentUnit::Words => word_re()
            .map(|re| re.find_iter(text).map(|m| (m.start(), m.end())).collect())
            .unwrap_or_default(),
    }
}

/// Unit indices `b` such that a new sentence starts at unit `b` (ascending).
fn sentence_boundaries(text: &str, units: &[(usize, usize)]) -> Vec<usize> {
    let Some(re) = sentence_break_re() else {
        return Vec::new();
    };
    let starts: Vec<usize> = re
        .find_iter(text)
        .map(|m| m.end())
        .filter(|&e| e < text.len())
        .collect();

    let mut out = Vec::new();
    let mut next = 0usize;
    let mut sentence_of_prev = 0usize;
    for (i, &(unit_start, _)) in units.iter().enumerate() {
        while next < starts.len() && starts[next] <= unit_start {
            next += 1;
        }
        if i > 0 && next != sentence_of_prev {
            out.push(i);
        }
        sentence_of_prev = next;
    }
    out
}

/// Greedy packing of `n` units into `[first, last)` ranges of at most `max` units.
fn pack(n: usize, boundaries: &[usize], max: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0usize;
    while start < n {
        let hard_end = (start + max).min(n);
        let end = if hard_end == n {
            n
        } else {
            let upto = boundaries.partition_point(|&b| b <= hard_end);
            match boundaries[..upto].last() {
                // Must leave room past the overlap or the next start would not advance.
                Some(&b) if b > start + overlap => b,
                _ => hard_end,
            }
        };
        out.push((start, end));
        if end == n {
            break;
        }
        start = end - overlap;
    }
    out
}
