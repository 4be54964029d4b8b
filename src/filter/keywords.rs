//! Keyword lists for the exclusion and aggressive-inclusion checks.
//!
//! Every keyword and exception phrase is stored lowercased; matching is plain
//! substring search over lowercased text.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Exclusion list used when exclusion is enabled without a keyword file.
pub const DEFAULT_EXCLUDE_KEYWORDS: [&str; 6] = [
    "sponsored",
    "advertisement",
    "giveaway",
    "clickbait",
    "advertorial",
    "paid content",
];

/// Aggressive-inclusion list used when aggressive filtering is enabled without a file.
pub const DEFAULT_AGGRESSIVE_KEYWORDS: [&str; 1] = ["security"];

pub fn default_exclude_keywords() -> BTreeSet<String> {
    DEFAULT_EXCLUDE_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

pub fn default_aggressive_keywords() -> BTreeSet<String> {
    DEFAULT_AGGRESSIVE_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// Built-in exceptions: `sponsored` never matches inside `state-sponsored`.
pub fn default_exceptions() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([("sponsored".to_string(), vec!["state-sponsored".to_string()])])
}

/// Parses a keyword list: one keyword per line, `#` starts a comment line,
/// blank lines are ignored.
pub fn parse_keywords(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

/// Reads and parses a keyword file.
pub fn load_keywords(path: &Path) -> std::io::Result<BTreeSet<String>> {
    let content = std::fs::read_to_string(path)?;
    let keywords = parse_keywords(&content);
    tracing::debug!(path = %path.display(), count = keywords.len(), "Loaded keyword file");
    Ok(keywords)
}

/// Lowercases keys and phrases of an exception table, dropping empty phrases.
pub fn normalize_exceptions(
    exceptions: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    exceptions
        .iter()
        .map(|(keyword, phrases)| {
            let phrases = phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect();
            (keyword.trim().to_lowercase(), phrases)
        })
        .collect()
}
