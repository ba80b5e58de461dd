// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::FeedSpec;

const ENV_PATH: &str = "INGEST_SOURCES_PATH";

/// Load feed list from an explicit path. Supports TOML or JSON formats.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

/// Load feeds using env var + fallbacks:
/// 1) $INGEST_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_feeds_default() -> Result<Vec<FeedSpec>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<FeedSpec>> {
    let try_toml = hint_ext == "toml" || s.contains("[[feeds]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feed list format"))
}

fn parse_toml(s: &str) -> Result<Vec<FeedSpec>> {
    #[derive(serde::Deserialize)]
    struct TomlFeeds {
        #[serde(default)]
        feeds: Vec<FeedSpec>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(clean_list(v.feeds))
}

fn parse_json(s: &str) -> Result<Vec<FeedSpec>> {
    let v: Vec<FeedSpec> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop blanks, one entry per URL (first wins), sorted by URL.
fn clean_list(items: Vec<FeedSpec>) -> Vec<FeedSpec> {
    use std::collections::BTreeMap;
    let mut by_url = BTreeMap::new();
    for it in items {
        let site = it.site.trim();
        let url = it.url.trim();
        if site.is_empty() || url.is_empty() {
            continue;
        }
        by_url.entry(url.to_string()).or_insert_with(|| FeedSpec {
            site: site.to_string(),
            url: url.to_string(),
        });
    }
    by_url.into_values().collect()
}
