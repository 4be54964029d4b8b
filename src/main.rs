use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use feedsieve::config::Config;
use feedsieve::feed::{self, OrderBy, ReqwestTransport, Retriever, RunResult, SourceList};
use feedsieve::report::{self, OutputFormat, Report};
use feedsieve::storage::CacheStore;

const SEPARATOR: &str = "----------------------------------------";
const PRINT_FORMAT: &str = "%A, %d %B %Y %H:%M";

/// Get the config directory path (~/.config/feedsieve/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsieve"))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    Date,
    Feed,
}

impl From<OrderArg> for OrderBy {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Date => OrderBy::Date,
            OrderArg::Feed => OrderBy::Feed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
    Html,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Html => OutputFormat::Html,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "feedsieve",
    about = "Fetch RSS/Atom feeds from an OPML list, filter them by keyword and write a report"
)]
struct Args {
    /// Config file (default: ~/.config/feedsieve/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// OPML source list
    #[arg(long, value_name = "FILE")]
    opml: Option<PathBuf>,

    /// Window start, in days before now
    #[arg(long, value_name = "DAYS")]
    start: Option<u32>,

    /// Window end, in days before now
    #[arg(long, value_name = "DAYS")]
    end: Option<u32>,

    /// Neither read nor write the response cache
    #[arg(long)]
    ignore_cache: bool,

    /// Revalidate cached feeds with conditional requests
    #[arg(long)]
    conditional_cache: bool,

    /// Reject entries matching the exclusion keywords
    #[arg(long)]
    exclude_keywords: bool,

    /// Only keep entries matching an aggressive keyword
    #[arg(long)]
    aggressive_filtering: bool,

    /// Maximum number of feeds processed at once
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Directory for the report files
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Report formats to write, comma separated
    #[arg(long, value_enum, value_delimiter = ',')]
    output_format: Vec<FormatArg>,

    /// Print every accepted article
    #[arg(long)]
    print_retrieved: bool,

    /// Print every rejected article with its reason
    #[arg(long)]
    print_skipped: bool,

    /// Ordering of the article lists
    #[arg(long, value_enum)]
    order_by: Option<OrderArg>,
}

impl Args {
    /// Command-line flags override the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(opml) = &self.opml {
            config.opml_path = Some(opml.clone());
        }
        if let Some(start) = self.start {
            config.start_days = start;
        }
        if let Some(end) = self.end {
            config.end_days = end;
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent_tasks = n;
        }
        if let Some(output) = &self.output {
            config.output_dir = Some(output.clone());
        }
        if !self.output_format.is_empty() {
            config.output_format = self.output_format.iter().copied().map(Into::into).collect();
        }
        if let Some(order) = self.order_by {
            config.order_by = order.into();
        }
        config.ignore_cache |= self.ignore_cache;
        config.exclude_keywords |= self.exclude_keywords;
        config.aggressive_filtering |= self.aggressive_filtering;
        if self.conditional_cache {
            config.no_conditional_cache = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let started = Instant::now();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config file {}", config_path.display()))?;
    args.apply(&mut config);

    let now = Utc::now();
    let options = config.resolve(now).context("Invalid configuration")?;

    let opml_path = config
        .opml_path
        .clone()
        .unwrap_or_else(|| config_dir.join("feeds.opml"));
    let sources = feed::load_source_list(&opml_path)
        .await
        .context("Failed to load source list")?;

    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("cache"));
    let cache = CacheStore::new(&cache_dir).context("Failed to create cache directory")?;

    // SEC-007: cached responses are user data, keep the directory user-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(&cache_dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %cache_dir.display(), error = %e, "Failed to set cache directory permissions to 0700");
        }
    }

    if let Some(retention) = config.cache_retention() {
        match cache.prune(retention).await {
            Ok(stats) => tracing::info!(removed = stats.removed, kept = stats.kept, "Pruned cache"),
            Err(e) => tracing::warn!(error = %e, "Cache pruning failed"),
        }
    }

    let transport = ReqwestTransport::new(options.request_timeout).context("Failed to build HTTP client")?;
    let retriever = Retriever::new(Arc::new(transport), cache);

    println!(
        "Fetching {} feeds from {} ({} UTC to {} UTC)",
        sources.feeds.len(),
        opml_path.display(),
        options.start_date.format(PRINT_FORMAT),
        options.end_date.format(PRINT_FORMAT)
    );

    // Outstanding feed tasks are dropped with the runtime on interrupt.
    let result = tokio::select! {
        result = feed::run(&retriever, sources.feeds.clone(), &options) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, abandoning outstanding feeds");
            eprintln!("Interrupted.");
            return Ok(());
        }
    };

    if args.print_retrieved {
        print_articles("Retrieved", &result.accepted);
    }
    if args.print_skipped {
        print_articles("Skipped", &result.rejected);
    }

    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("reports"));
    let report = Report::new(&result, &sources, options.start_date, options.end_date, now);
    let prefix = report::file_prefix(&sources);
    let mut written = Vec::with_capacity(config.output_format.len());
    for &format in &config.output_format {
        let path = report::write(&report, format, &output_dir, &prefix, now)
            .with_context(|| format!("Failed to write {} report", format.label()))?;
        written.push((format, path));
    }

    print_summary(&Summary {
        start: options.start_date,
        end: options.end_date,
        opml_path: &opml_path,
        sources: &sources,
        result: &result,
        reports: &written,
        started,
    });
    Ok(())
}

fn print_articles(heading: &str, articles: &[feed::Article]) {
    println!("\n{SEPARATOR}\n{heading} ({})\n{SEPARATOR}", articles.len());
    for article in articles {
        println!("{}", report::article_line(article));
    }
}

struct Summary<'a> {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    opml_path: &'a std::path::Path,
    sources: &'a SourceList,
    result: &'a RunResult,
    reports: &'a [(OutputFormat, PathBuf)],
    started: Instant,
}

fn print_summary(s: &Summary<'_>) {
    println!("\n{SEPARATOR}\nSummary\n{SEPARATOR}");
    println!(
        "Time range: {} UTC to {} UTC",
        s.start.format(PRINT_FORMAT),
        s.end.format(PRINT_FORMAT)
    );
    println!("OPML file: {} ({} feeds)", s.opml_path.display(), s.sources.feeds.len());
    println!("Accepted entries: {}", s.result.accepted.len());
    println!("Rejected entries: {}", s.result.rejected.len());
    for (format, path) in s.reports {
        println!("{} written to file: {}", format.label(), path.display());
    }

    if !s.result.errors.is_empty() {
        println!("Feeds that failed to fetch ({}):", s.result.errors.len());
        for failure in &s.result.errors {
            println!("\t- {}: {} ({})", failure.feed_title, failure.feed_url, failure.cause);
        }
    }

    println!("Total execution time: {:.4} seconds", s.started.elapsed().as_secs_f64());
    println!("{SEPARATOR}");
}
