//! Report files (JSON, CSV, HTML) and console formatting of run results.
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::{Article, FeedFailure, RunResult, SourceList};
use crate::util::website_name;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const WINDOW_FORMAT: &str = "%A, %d %B %Y %H:%M";
const ROW_DATE_FORMAT: &str = "%d %b %Y %H:%M";

const CSV_HEADER: [&str; 5] = ["Date (UTC)", "Website", "Title", "Description", "Link"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to encode CSV report: {0}")]
    Csv(#[from] csv::Error),
}

/// Report file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Html,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Html => "html",
        }
    }

    /// Upper-case name for console output.
    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::Json => "JSON",
            OutputFormat::Csv => "CSV",
            OutputFormat::Html => "HTML",
        }
    }
}

/// Serialized shape of the JSON report; the CSV and HTML writers read the same data.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub start_date: String,
    pub end_date: String,
    pub published: String,
    pub title: Option<&'a str>,
    pub text: Option<&'a str>,
    pub items: Vec<ReportItem<'a>>,
    pub skipped: Vec<ReportItem<'a>>,
    pub errors: &'a [FeedFailure],
    #[serde(skip)]
    window: (DateTime<Utc>, DateTime<Utc>),
}

#[derive(Debug, Serialize)]
pub struct ReportItem<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub published: String,
    /// Host of the article link.
    pub source: String,
    pub feed_title: &'a str,
    pub description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
    #[serde(skip)]
    pub published_at: DateTime<Utc>,
    /// Channel image, or the source list's icon hint.
    #[serde(skip)]
    pub image: Option<&'a str>,
}

impl<'a> ReportItem<'a> {
    fn from_article(article: &'a Article) -> Self {
        Self {
            title: article.title.trim_matches('"'),
            link: &article.link,
            published: article.published.format(TIMESTAMP_FORMAT).to_string(),
            source: website_name(&article.link),
            feed_title: &article.feed_title,
            description: article.description.trim_matches('"'),
            reason: article.skipped_reason.as_deref(),
            published_at: article.published,
            image: article.channel_image.as_deref(),
        }
    }
}

impl<'a> Report<'a> {
    /// Builds the report; items and skipped entries are listed newest first.
    pub fn new(
        result: &'a RunResult,
        sources: &'a SourceList,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            start_date: start_date.format(TIMESTAMP_FORMAT).to_string(),
            end_date: end_date.format(TIMESTAMP_FORMAT).to_string(),
            published: now.format(DATE_FORMAT).to_string(),
            title: sources.title.as_deref(),
            text: sources.text.as_deref(),
            items: newest_first(&result.accepted),
            skipped: newest_first(&result.rejected),
            errors: &result.errors,
            window: (start_date, end_date),
        }
    }

    /// Accepted items, oldest first.
    fn items_ascending(&self) -> impl Iterator<Item = &ReportItem<'a>> {
        self.items.iter().rev()
    }

    fn window_text(&self) -> (String, String) {
        (
            self.window.0.format(WINDOW_FORMAT).to_string(),
            self.window.1.format(WINDOW_FORMAT).to_string(),
        )
    }
}

fn newest_first(articles: &[Article]) -> Vec<ReportItem<'_>> {
    let mut sorted: Vec<&Article> = articles.iter().collect();
    sorted.sort_by(|a, b| b.published.cmp(&a.published));
    sorted.into_iter().map(ReportItem::from_article).collect()
}

/// Report file stem derived from the source list's header text:
/// lowercased, keeping only ASCII alphanumerics and `_`.
pub fn file_prefix(sources: &SourceList) -> String {
    let prefix: String = sources
        .text
        .as_deref()
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if prefix.is_empty() {
        "feedsieve".to_string()
    } else {
        prefix
    }
}

/// Writes `report` in `format` into `dir` as `<prefix>_<timestamp>.<ext>`,
/// returning the file path.
pub fn write(
    report: &Report<'_>,
    format: OutputFormat,
    dir: &Path,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf, ReportError> {
    let content = match format {
        OutputFormat::Json => serde_json::to_vec_pretty(report)?,
        OutputFormat::Csv => render_csv(report)?,
        OutputFormat::Html => render_html(report).into_bytes(),
    };

    std::fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(format!(
        "{prefix}_{}.{}",
        now.format(FILE_TIMESTAMP_FORMAT),
        format.extension()
    ));
    write_atomic(&path, &content, now)?;

    tracing::info!(path = %path.display(), format = format.label(), items = report.items.len(), "Wrote report");
    Ok(path)
}

/// Shorthand for [`write`] with [`OutputFormat::Json`].
pub fn write_json(
    report: &Report<'_>,
    dir: &Path,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf, ReportError> {
    write(report, OutputFormat::Json, dir, prefix, now)
}

/// Writes to a temporary name and renames into place, so readers never see a
/// partial report.
fn write_atomic(path: &Path, content: &[u8], now: DateTime<Utc>) -> Result<(), ReportError> {
    let temp_path = path.with_extension(format!(
        "tmp.{:016x}",
        now.timestamp_nanos_opt().unwrap_or_default()
    ));
    let write = |target: &Path| -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)?;
        file.write_all(content)?;
        file.sync_all()
    };

    if let Err(source) = write(&temp_path).and_then(|()| std::fs::rename(&temp_path, path)) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(ReportError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Metadata lines, a blank line, then one row per accepted item, oldest first.
fn render_csv(report: &Report<'_>) -> Result<Vec<u8>, ReportError> {
    let (start, end) = report.window_text();
    let mut out = Vec::new();

    {
        let mut meta = csv::WriterBuilder::new().flexible(true).from_writer(&mut out);
        meta.write_record([format!("Time range: {start} to {end}")])?;
        meta.write_record([format!("Report Title: {}", report.title.unwrap_or_default())])?;
        meta.write_record([format!("Report Description: {}", report.text.unwrap_or_default())])?;
        meta.flush().map_err(csv::Error::from)?;
    }
    out.push(b'\n');

    {
        let mut rows = csv::Writer::from_writer(&mut out);
        rows.write_record(CSV_HEADER)?;
        for item in report.items_ascending() {
            rows.write_record([
                item.published_at.format(ROW_DATE_FORMAT).to_string().as_str(),
                item.source.as_str(),
                item.title.trim(),
                item.description.trim(),
                item.link.trim(),
            ])?;
        }
        rows.flush().map_err(csv::Error::from)?;
    }

    Ok(out)
}

fn html_text(text: &str) -> String {
    escape(text).replace('\r', "").replace('\n', "<br>")
}

/// Self-contained HTML page with one table row per accepted item, oldest first.
fn render_html(report: &Report<'_>) -> String {
    let (start, end) = report.window_text();
    let title = html_text(report.title.unwrap_or("feedsieve"));
    let text = html_text(report.text.unwrap_or_default());

    let mut rows = String::new();
    for item in report.items_ascending() {
        let website = html_text(&item.source);
        let image = item
            .image
            .map(|src| format!("<img src='{}' alt='{website}' class='channel-image'>", escape(src)))
            .unwrap_or_default();
        rows.push_str(&format!(
            "<tr><td>{}</td><td><b>{website}</b></td><td>{image}</td>\
             <td><a href='{}' target='_blank'>{}</a></td><td class='italic-cell'>{}</td></tr>\n",
            item.published_at.format(ROW_DATE_FORMAT),
            escape(item.link),
            html_text(item.title),
            html_text(item.description),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; width: 100%; }}
td {{ border-bottom: 1px solid #ddd; padding: 0.4em; vertical-align: top; }}
.channel-image {{ max-width: 32px; max-height: 32px; }}
.italic-cell {{ font-style: italic; }}
</style>
</head>
<body>
<h1>{title}</h1>
<p>{text}</p>
<p>{start} UTC to {end} UTC</p>
<table>
{rows}</table>
</body>
</html>
"#
    )
}

/// One console line per article: date, feed, title, link and skip reason if any.
pub fn article_line(article: &Article) -> String {
    let mut line = format!(
        "{} | {} | {}\n    {}",
        article.published.format(TIMESTAMP_FORMAT),
        article.feed_title,
        article.title,
        article.link
    );
    if let Some(reason) = &article.skipped_reason {
        line.push_str("\n    Skipped: ");
        line.push_str(reason);
    }
    line
}
