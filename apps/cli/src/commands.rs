//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};
use url::Url;

use spiderbase_ingest::IngestionPipeline;
use spiderbase_shared::{AppConfig, CrawlId, init_config, load_config};
use spiderbase_storage::{CrawlLedger, MaintenanceScheduler, SchemaRegistry, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// spiderbase — persist evolving crawl exports into a relational store.
#[derive(Parser)]
#[command(
    name = "spiderbase",
    version,
    about = "Ingest tabular crawl output into a dynamically schemed result store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the result database (overrides config).
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Record the start of a crawl and print its identifier.
    Begin {
        /// Target URL of the crawl.
        url: String,

        /// Configuration file reference passed to the crawler.
        #[arg(short, long)]
        config: Option<String>,

        /// Exact crawler invocation, kept verbatim for audit.
        #[arg(long)]
        command: Option<String>,
    },

    /// Ingest one or more delimited export files for a crawl.
    Ingest {
        /// Crawl identifier from `begin`.
        #[arg(long)]
        crawl: String,

        /// Export files to ingest (header line = field names).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Record successful completion of a crawl.
    Complete {
        /// Crawl identifier from `begin`.
        #[arg(long)]
        crawl: String,

        /// Elapsed crawl time in seconds.
        #[arg(long)]
        elapsed: f64,
    },

    /// Record a failed crawl.
    Fail {
        /// Crawl identifier from `begin`.
        #[arg(long)]
        crawl: String,

        /// Elapsed time in seconds before the failure.
        #[arg(long)]
        elapsed: f64,

        /// Error detail to record.
        #[arg(long)]
        error: String,
    },

    /// Storage maintenance operations.
    Maintenance {
        #[command(subcommand)]
        action: MaintenanceAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Maintenance subcommands.
#[derive(Subcommand)]
pub(crate) enum MaintenanceAction {
    /// Compact the store and refresh statistics (VACUUM/ANALYZE).
    Optimize,
    /// Delete crawl records and dependent result rows past the retention window.
    Cleanup {
        /// Retention window in days (defaults to config).
        #[arg(long)]
        days: Option<u32>,
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
        0 => "spiderbase=info",
        1 => "spiderbase=debug",
        _ => "spiderbase=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Begin {
            url,
            config,
            command,
        } => cmd_begin(cli.db.as_deref(), &url, config.as_deref(), command.as_deref()).await,
        Command::Ingest { crawl, files } => cmd_ingest(cli.db.as_deref(), &crawl, &files).await,
        Command::Complete { crawl, elapsed } => {
            cmd_complete(cli.db.as_deref(), &crawl, elapsed).await
        }
        Command::Fail {
            crawl,
            elapsed,
            error,
        } => cmd_fail(cli.db.as_deref(), &crawl, elapsed, &error).await,
        Command::Maintenance { action } => match action {
            MaintenanceAction::Optimize => cmd_optimize(cli.db.as_deref()).await,
            MaintenanceAction::Cleanup { days } => cmd_cleanup(cli.db.as_deref(), days).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Open the store at the CLI-overridden or configured path.
async fn open_storage(db_override: Option<&str>, config: &AppConfig) -> Result<Storage> {
    let path = PathBuf::from(db_override.unwrap_or(&config.defaults.db_path));
    Ok(Storage::open(&path).await?)
}

fn parse_crawl_id(raw: &str) -> Result<CrawlId> {
    raw.parse()
        .map_err(|e| eyre!("invalid crawl id '{raw}': {e}"))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_begin(
    db: Option<&str>,
    url: &str,
    config_ref: Option<&str>,
    command: Option<&str>,
) -> Result<()> {
    let config = load_config()?;

    // The URL is recorded, not fetched, but a malformed one is caught here.
    let parsed_url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let storage = open_storage(db, &config).await?;
    let ledger = CrawlLedger::new(&storage);
    let id = ledger
        .begin(
            parsed_url.as_str(),
            config_ref,
            command.unwrap_or("unspecified"),
        )
        .await?;

    println!("{id}");
    Ok(())
}

async fn cmd_ingest(db: Option<&str>, crawl: &str, files: &[PathBuf]) -> Result<()> {
    let config = load_config()?;
    let crawl_id = parse_crawl_id(crawl)?;
    let storage = open_storage(db, &config).await?;
    let pipeline = IngestionPipeline::new(&storage);
    let ledger = CrawlLedger::new(&storage);
    let start = Instant::now();

    let mut total = 0usize;
    for file in files {
        match pipeline
            .ingest_file(file, &crawl_id, config.ingest.delimiter)
            .await
        {
            Ok(stored) => {
                println!("  {}: {stored} rows", file.display());
                total += stored;
            }
            Err(e) => {
                // An ingestion failure closes the crawl as failed, capturing
                // the error detail. The ledger itself never blocks this path.
                let elapsed = start.elapsed().as_secs_f64();
                if let Err(ledger_err) = ledger.fail(&crawl_id, elapsed, &e.to_string()).await {
                    warn!(error = %ledger_err, "could not record crawl failure");
                }
                return Err(eyre!("ingestion of {} failed: {e}", file.display()));
            }
        }
    }

    ledger.record_item_count(&crawl_id, total as i64).await?;

    info!(crawl_id = %crawl_id, total, files = files.len(), "ingestion complete");
    println!("Stored {total} rows from {} file(s).", files.len());
    Ok(())
}

async fn cmd_complete(db: Option<&str>, crawl: &str, elapsed: f64) -> Result<()> {
    let config = load_config()?;
    let crawl_id = parse_crawl_id(crawl)?;
    let storage = open_storage(db, &config).await?;

    CrawlLedger::new(&storage).complete(&crawl_id, elapsed).await?;
    println!("Crawl {crawl_id} completed ({elapsed:.1}s).");
    Ok(())
}

async fn cmd_fail(db: Option<&str>, crawl: &str, elapsed: f64, error: &str) -> Result<()> {
    let config = load_config()?;
    let crawl_id = parse_crawl_id(crawl)?;
    let storage = open_storage(db, &config).await?;

    CrawlLedger::new(&storage)
        .fail(&crawl_id, elapsed, error)
        .await?;
    println!("Crawl {crawl_id} marked failed.");
    Ok(())
}

async fn cmd_optimize(db: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;

    MaintenanceScheduler::new(&storage).optimize().await?;
    println!("Optimization complete.");
    Ok(())
}

async fn cmd_cleanup(db: Option<&str>, days: Option<u32>) -> Result<()> {
    let config = load_config()?;
    let retention_days = days.unwrap_or(config.defaults.retention_days);
    let storage = open_storage(db, &config).await?;

    let report = MaintenanceScheduler::new(&storage)
        .cleanup(retention_days)
        .await?;

    println!("Cleanup complete (retention: {retention_days} days).");
    for (table, deleted) in &report.per_table {
        println!("  {table}: {deleted} rows");
    }
    println!("  crawl_metadata: {} rows", report.crawls_deleted);

    // Remaining result tables, for operator orientation
    let tables = SchemaRegistry::new(&storage).list_result_tables().await?;
    if !tables.is_empty() {
        println!("Result tables: {}", tables.join(", "));
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
