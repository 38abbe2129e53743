//! Novel-Spider main entry point
//!
//! This is the command-line interface for the Novel-Spider listing crawler.

use anyhow::Context;
use clap::Parser;
use novel_spider::config::{load_config_with_hash, Config};
use novel_spider::crawler::{run_schedule, Coordinator};
use novel_spider::output::{load_statistics, print_run_summary, print_search_page, print_statistics};
use novel_spider::state::SessionState;
use novel_spider::storage::{SearchQuery, SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Novel-Spider: a paced crawler for a novel listing site
///
/// Novel-Spider walks the site's paginated listing, extracts one record per
/// novel and keeps them in a local SQLite store. Without a mode flag it runs
/// as a daemon that crawls once per scheduled interval.
#[derive(Parser, Debug)]
#[command(name = "novel-spider")]
#[command(version = "1.0.0")]
#[command(about = "A paced crawler for a novel listing site", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the effective settings without crawling
    #[arg(long, conflicts_with_all = ["stats", "crawl", "search"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "crawl", "search"])]
    stats: bool,

    /// Run a single crawl in the foreground and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "search"])]
    crawl: bool,

    /// Page offset; the crawl starts at the page after this one
    #[arg(long, default_value_t = 0, requires = "crawl")]
    start: u32,

    /// Number of pages to crawl (defaults to spider.max-pages)
    #[arg(long, requires = "crawl")]
    pages: Option<u32>,

    /// Search the stored novels and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "crawl"])]
    search: bool,

    /// Title substring filter
    #[arg(long, requires = "search")]
    title: Option<String>,

    /// Author substring filter
    #[arg(long, requires = "search")]
    author: Option<String>,

    /// Exact serialization status filter
    #[arg(long, requires = "search")]
    status: Option<String>,

    /// Exact category filter
    #[arg(long, requires = "search")]
    category: Option<String>,

    /// Zero-based result page
    #[arg(long, default_value_t = 0, requires = "search")]
    page: u32,

    /// Results per page (1-100)
    #[arg(long, default_value_t = 20, requires = "search")]
    page_size: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.search {
        handle_search(&config, &cli)?;
    } else if cli.crawl {
        let pages = cli.pages.unwrap_or(config.spider.max_pages);
        handle_crawl(config, &config_hash, cli.start, pages).await?;
    } else {
        handle_daemon(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("novel_spider=info,warn"),
            1 => EnvFilter::new("novel_spider=debug,info"),
            2 => EnvFilter::new("novel_spider=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the effective settings
fn handle_dry_run(config: &Config) {
    println!("=== Novel-Spider Dry Run ===\n");

    println!("Source Site:");
    println!("  Base URL: {}", config.spider.base());
    println!("  First page: {}/html/1.html", config.spider.base());
    println!("  Timeout: {}ms", config.spider.timeout_ms);
    println!("  Pages per scheduled run: {}", config.spider.max_pages);
    println!("  User agent: {}", config.spider.user_agent);

    println!("\nSession:");
    let session = SessionState::load(&config.session.cookie_file, &config.session.default_cookie);
    if let Some(path) = session.path() {
        let source = if path.exists() { "saved" } else { "default, no saved file" };
        println!("  Cookie file: {} ({})", path.display(), source);
    }
    println!("  Cookie sent: {}", session.current());

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Initial backoff: {}ms", config.retry.initial_delay_ms);
    println!("  Block cooldown: {}ms", config.retry.block_cooldown_ms);
    println!("  Max session challenges: {}", config.retry.max_challenges);

    println!("\nPacing:");
    println!(
        "  Delay: {}ms + page x {}ms + jitter < {}ms",
        config.pacing.base_delay_ms, config.pacing.per_page_delay_ms, config.pacing.jitter_ms
    );
    println!("  Stop after {} consecutive page failures", config.crawl.max_errors + 1);

    println!("\nSchedule:");
    println!("  Interval: {}s", config.schedule.interval_secs);
    println!("  Run on start: {}", config.schedule.run_on_start);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --search mode: queries the stored novels
fn handle_search(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    let query = SearchQuery {
        title: cli.title.clone(),
        author: cli.author.clone(),
        status: cli.status.clone(),
        category: cli.category.clone(),
        page: cli.page,
        page_size: cli.page_size,
    };

    let page = storage.search_novels(&query)?;
    print_search_page(&page);

    Ok(())
}

/// Handles the --crawl mode: one run in the foreground
async fn handle_crawl(
    config: Config,
    config_hash: &str,
    start: u32,
    pages: u32,
) -> anyhow::Result<()> {
    let coordinator = Coordinator::new(config, config_hash)?;

    tracing::info!("Starting crawl of {} page(s) after page {}", pages, start);
    let summary = coordinator
        .crawl(start, pages)
        .await
        .context("crawl did not produce a summary")?;

    print_run_summary(&summary);
    Ok(())
}

/// Handles the default mode: the periodic crawl daemon
async fn handle_daemon(config: Config, config_hash: &str) -> anyhow::Result<()> {
    let schedule = config.schedule.clone();
    let coordinator = Coordinator::new(config, config_hash)?;

    run_schedule(coordinator.clone(), schedule).await;

    if coordinator.is_running() {
        tracing::warn!("Exiting while a crawl is in progress; it will be marked interrupted on next start");
    }
    Ok(())
}

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    SqliteStorage::new(Path::new(&config.output.database_path))
        .with_context(|| format!("failed to open database {}", config.output.database_path))
}
