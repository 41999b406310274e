//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use wikidigest_core::{DigestService, Summarizer, api};
use wikidigest_crawler::{CrawlProgress, CrawlReport, Crawler};
use wikidigest_shared::{
    AppConfig, CrawlConfig, WikiDigestError, database_path, init_config, load_config,
    load_config_from, validate_api_key,
};
use wikidigest_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// WikiDigest: crawl wiki articles into a document tree and summarise the roots.
#[derive(Parser)]
#[command(
    name = "wikidigest",
    version,
    about = "Crawl wiki articles into a bounded document tree and summarise them with an LLM.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.wikidigest/wikidigest.toml).
    #[arg(long, global = true, env = "WIKIDIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP API.
    Serve {
        /// Bind address (overrides `[server].host`).
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides `[server].port`).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Crawl an article tree in the foreground.
    Crawl {
        /// Root article URL.
        url: String,
    },

    /// Show a stored document, summarising it if it is an unsummarised root.
    Summary {
        /// Article URL.
        url: String,
    },

    /// Generate summaries for every root that has none.
    SummarizePending,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "wikidigest=info",
        1 => "wikidigest=debug,tower_http=debug",
        _ => "wikidigest=trace,tower_http=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Serve { host, port } => cmd_serve(&config, host, port).await,
        Command::Crawl { url } => cmd_crawl(&config, &url).await,
        Command::Summary { url } => cmd_summary(&config, &url).await,
        Command::SummarizePending => cmd_summarize_pending(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

async fn build_service(config: &AppConfig) -> Result<DigestService> {
    let db_path = database_path(config)?;
    info!(path = %db_path.display(), "opening database");

    let storage = Storage::open(&db_path).await?;
    let crawler = Crawler::new(CrawlConfig::from(config))?;
    let summarizer = Summarizer::from_config(&config.summarizer)?;
    Ok(DigestService::new(crawler, storage, summarizer))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config: &AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let service = Arc::new(build_service(config).await?);
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    api::serve(service, &host, port).await?;
    Ok(())
}

async fn cmd_crawl(config: &AppConfig, url: &str) -> Result<()> {
    let service = build_service(config).await?;

    let reporter = CliProgress::new();
    let report = service.crawl_now(url, &reporter).await?;
    reporter.finish();

    print_report(url, &report);
    Ok(())
}

async fn cmd_summary(config: &AppConfig, url: &str) -> Result<()> {
    let service = build_service(config).await?;
    let view = service.query(url).await?;

    println!();
    println!("  {}", view.title);
    println!("  URL:      {}", view.url);
    println!("  Children: {}", view.children_count);
    println!();
    match view.summary {
        Some(summary) => println!("  {summary}"),
        None => println!("  (no summary available)"),
    }
    println!();
    Ok(())
}

async fn cmd_summarize_pending(config: &AppConfig) -> Result<()> {
    validate_api_key(config)?;
    let service = build_service(config).await?;

    let done = service.summarize_pending().await?;
    println!("Summarised {done} root document(s).");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_report(url: &str, report: &CrawlReport) {
    println!();
    match report.root {
        Some(id) => println!("  Crawl of {url} finished (root document #{id})"),
        None => println!("  Crawl of {url} produced no root document"),
    }
    println!("  Created:  {}", report.documents_created);
    println!("  Existing: {}", report.documents_existing);
    println!("  Skipped:  {}", report.branches_skipped);
    println!("  Failed:   {}", report.failures.len());
    for failure in &report.failures {
        println!(
            "    - [{:?}] depth {} {}: {}",
            failure.kind, failure.depth, failure.url, failure.message
        );
    }
    println!("  Time:     {:.1}s", report.duration.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Crawl progress shown as an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Crawling");
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl CrawlProgress for CliProgress {
    fn document_stored(&self, url: &str, depth: u32, stored: usize) {
        self.spinner
            .set_message(format!("Stored [{stored}] depth {depth}: {url}"));
    }

    fn branch_failed(&self, url: &str, error: &WikiDigestError) {
        self.spinner
            .println(format!("  ! {url}: {error}"));
    }
}
