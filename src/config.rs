//! Configuration file parser for ~/.config/feedsieve/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. [`Config::resolve`] turns the loaded values into
//! the immutable [`FeedOptions`] for one run.
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FeedOptions, OrderBy, DEFAULT_MAX_CONCURRENT_TASKS};
use crate::filter::keywords;
use crate::report::OutputFormat;

/// Upper bound for `start_days` / `end_days`.
pub const MAX_DAYS_BACK: u32 = 31;
/// Upper bound for `max_description_length`.
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read keyword file {}: {source}", path.display())]
    KeywordFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OPML source list. Defaults to `feeds.opml` in the config directory.
    pub opml_path: Option<PathBuf>,

    /// Response cache directory. Defaults to `cache/` in the config directory.
    pub cache_dir: Option<PathBuf>,

    /// Window start, in days before now.
    pub start_days: u32,

    /// Window end, in days before now.
    pub end_days: u32,

    /// Move the window start back to 00:00 UTC of its day.
    pub align_start_to_midnight: bool,

    /// Move the window end back to 00:00 UTC of its day.
    pub align_end_to_midnight: bool,

    /// Description bound in characters (1..=1000).
    pub max_description_length: usize,

    /// Enable the exclusion check.
    pub exclude_keywords: bool,

    /// Exclusion keyword list; the built-in list is used when unset.
    pub exclude_keywords_file: Option<PathBuf>,

    /// Exclusion keyword → phrases that veto it. The built-in table is used when unset.
    pub keyword_exceptions: Option<BTreeMap<String, Vec<String>>>,

    /// Enable the aggressive-inclusion check.
    pub aggressive_filtering: bool,

    /// Aggressive keyword list; the built-in list is used when unset.
    pub aggressive_keywords_file: Option<PathBuf>,

    pub ignore_cache: bool,

    /// Serve fresh cache entries without revalidation instead of sending
    /// conditional requests.
    pub no_conditional_cache: bool,

    pub max_concurrent_tasks: usize,

    pub cache_max_age_seconds: u64,

    pub request_timeout_seconds: u64,

    /// Prune cache entries older than this many days at startup. 0 = never.
    pub cache_retention_days: u32,

    pub order_by: OrderBy,

    /// Directory for the report files. Defaults to `reports/` in the working directory.
    pub output_dir: Option<PathBuf>,

    /// Report files to write, one per format.
    pub output_format: Vec<OutputFormat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opml_path: None,
            cache_dir: None,
            start_days: 1,
            end_days: 0,
            align_start_to_midnight: false,
            align_end_to_midnight: false,
            max_description_length: 200,
            exclude_keywords: false,
            exclude_keywords_file: None,
            keyword_exceptions: None,
            aggressive_filtering: false,
            aggressive_keywords_file: None,
            ignore_cache: false,
            no_conditional_cache: true,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            cache_max_age_seconds: 600,
            request_timeout_seconds: 10,
            cache_retention_days: 0,
            order_by: OrderBy::Date,
            output_dir: None,
            output_format: vec![OutputFormat::Json],
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 21] = [
        "opml_path",
        "cache_dir",
        "start_days",
        "end_days",
        "align_start_to_midnight",
        "align_end_to_midnight",
        "max_description_length",
        "exclude_keywords",
        "exclude_keywords_file",
        "keyword_exceptions",
        "aggressive_filtering",
        "aggressive_keywords_file",
        "ignore_cache",
        "no_conditional_cache",
        "max_concurrent_tasks",
        "cache_max_age_seconds",
        "request_timeout_seconds",
        "cache_retention_days",
        "order_by",
        "output_dir",
        "output_format",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or a wrongly typed value → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Validates the configuration and builds the options for a run starting at `now`.
    ///
    /// Keyword files are read here, so a missing file fails the run before any
    /// network traffic.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<FeedOptions, ConfigError> {
        if self.start_days > MAX_DAYS_BACK {
            return Err(invalid("start_days", format!("must be at most {MAX_DAYS_BACK}")));
        }
        if self.end_days > MAX_DAYS_BACK {
            return Err(invalid("end_days", format!("must be at most {MAX_DAYS_BACK}")));
        }
        if !(1..=MAX_DESCRIPTION_LENGTH).contains(&self.max_description_length) {
            return Err(invalid(
                "max_description_length",
                format!("must be between 1 and {MAX_DESCRIPTION_LENGTH}"),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks", "must be at least 1"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(invalid("request_timeout_seconds", "must be at least 1"));
        }
        if self.output_format.is_empty() {
            return Err(invalid("output_format", "must name at least one format"));
        }

        let start_date = days_before(now, self.start_days, self.align_start_to_midnight);
        let end_date = days_before(now, self.end_days, self.align_end_to_midnight);
        if start_date > end_date {
            return Err(invalid(
                "start_days",
                format!("window start {start_date} is after window end {end_date}"),
            ));
        }

        let mut options = FeedOptions::new(start_date, end_date);
        options.max_description_length = self.max_description_length;
        options.ignore_cache = self.ignore_cache;
        options.no_conditional_cache = self.no_conditional_cache;
        options.max_concurrent_tasks = self.max_concurrent_tasks;
        options.cache_max_age = Duration::from_secs(self.cache_max_age_seconds);
        options.request_timeout = Duration::from_secs(self.request_timeout_seconds);
        options.order_by = self.order_by;

        if self.exclude_keywords {
            options.exclude_keywords = keyword_list(
                self.exclude_keywords_file.as_deref(),
                keywords::default_exclude_keywords,
            )?;
        }
        options.keyword_exceptions = match &self.keyword_exceptions {
            Some(table) => keywords::normalize_exceptions(table),
            None => keywords::default_exceptions(),
        };
        if self.aggressive_filtering {
            options.aggressive_keywords = keyword_list(
                self.aggressive_keywords_file.as_deref(),
                keywords::default_aggressive_keywords,
            )?;
        }

        Ok(options)
    }

    /// Retention window for cache pruning, if enabled.
    pub fn cache_retention(&self) -> Option<Duration> {
        (self.cache_retention_days > 0)
            .then(|| Duration::from_secs(u64::from(self.cache_retention_days) * 86_400))
    }
}

fn days_before(now: DateTime<Utc>, days: u32, align_to_midnight: bool) -> DateTime<Utc> {
    let at = now - ChronoDuration::days(i64::from(days));
    if align_to_midnight {
        at.date_naive().and_time(NaiveTime::MIN).and_utc()
    } else {
        at
    }
}

fn keyword_list(
    path: Option<&Path>,
    defaults: fn() -> BTreeSet<String>,
) -> Result<BTreeSet<String>, ConfigError> {
    match path {
        Some(path) => keywords::load_keywords(path).map_err(|source| ConfigError::KeywordFile {
            path: path.to_path_buf(),
            source,
        }),
        None => Ok(defaults()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.start_days, 1);
        assert_eq!(config.end_days, 0);
        assert_eq!(config.max_description_length, 200);
        assert!(config.no_conditional_cache);
        assert!(!config.exclude_keywords);
        assert_eq!(config.max_concurrent_tasks, 15);
        assert_eq!(config.order_by, OrderBy::Date);
        assert_eq!(config.output_format, [OutputFormat::Json]);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedsieve_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (_dir, path) = write_config("   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
opml_path = "/srv/sources.opml"
start_days = 7
end_days = 1
max_description_length = 300
exclude_keywords = true
aggressive_filtering = true
no_conditional_cache = false
max_concurrent_tasks = 4
order_by = "feed"
output_format = ["csv", "html"]

[keyword_exceptions]
sponsored = ["state-sponsored", "government-sponsored"]
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.opml_path, Some(PathBuf::from("/srv/sources.opml")));
        assert_eq!(config.start_days, 7);
        assert_eq!(config.end_days, 1);
        assert!(!config.no_conditional_cache);
        assert_eq!(config.order_by, OrderBy::Feed);
        assert_eq!(config.output_format, [OutputFormat::Csv, OutputFormat::Html]);
        assert_eq!(
            config
                .keyword_exceptions
                .as_ref()
                .and_then(|t| t.get("sponsored"))
                .map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("start_days = \"yesterday\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("start_days = 2\ntotally_fake_key = 1\n");
        assert_eq!(Config::load(&path).unwrap().start_days, 2);
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
    }

    #[test]
    fn test_resolve_default_window() {
        let options = Config::default().resolve(noon()).unwrap();
        assert_eq!(options.start_date, Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap());
        assert_eq!(options.end_date, noon());
        assert!(options.exclude_keywords.is_empty());
        assert!(options.aggressive_keywords.is_empty());
        assert_eq!(options.keyword_exceptions, keywords::default_exceptions());
    }

    #[test]
    fn test_resolve_aligned_window() {
        let config = Config {
            align_start_to_midnight: true,
            align_end_to_midnight: true,
            ..Config::default()
        };
        let options = config.resolve(noon()).unwrap();
        assert_eq!(options.start_date, Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap());
        assert_eq!(options.end_date, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_resolve_rejects_out_of_range() {
        let too_far = Config {
            start_days: 32,
            ..Config::default()
        };
        assert!(matches!(
            too_far.resolve(noon()),
            Err(ConfigError::Invalid { key: "start_days", .. })
        ));

        let zero_len = Config {
            max_description_length: 0,
            ..Config::default()
        };
        assert!(zero_len.resolve(noon()).is_err());

        let inverted = Config {
            start_days: 1,
            end_days: 3,
            ..Config::default()
        };
        assert!(inverted.resolve(noon()).is_err());

        let no_output = Config {
            output_format: Vec::new(),
            ..Config::default()
        };
        assert!(matches!(
            no_output.resolve(noon()),
            Err(ConfigError::Invalid { key: "output_format", .. })
        ));
    }

    #[test]
    fn test_resolve_default_keyword_lists() {
        let config = Config {
            exclude_keywords: true,
            aggressive_filtering: true,
            ..Config::default()
        };
        let options = config.resolve(noon()).unwrap();
        assert!(options.exclude_keywords.contains("sponsored"));
        assert!(options.aggressive_keywords.contains("security"));
    }

    #[test]
    fn test_resolve_keyword_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclude.txt");
        std::fs::write(&path, "# custom\nWebinar\n").unwrap();

        let config = Config {
            exclude_keywords: true,
            exclude_keywords_file: Some(path),
            ..Config::default()
        };
        let options = config.resolve(noon()).unwrap();
        assert_eq!(
            options.exclude_keywords.into_iter().collect::<Vec<_>>(),
            vec!["webinar"]
        );
    }

    #[test]
    fn test_resolve_missing_keyword_file() {
        let config = Config {
            aggressive_filtering: true,
            aggressive_keywords_file: Some(PathBuf::from("/nonexistent/feedsieve/aggressive.txt")),
            ..Config::default()
        };
        assert!(matches!(
            config.resolve(noon()),
            Err(ConfigError::KeywordFile { .. })
        ));
    }

    #[test]
    fn test_cache_retention() {
        assert_eq!(Config::default().cache_retention(), None);
        let config = Config {
            cache_retention_days: 2,
            ..Config::default()
        };
        assert_eq!(config.cache_retention(), Some(Duration::from_secs(172_800)));
    }
}
