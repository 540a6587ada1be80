//! Cardano asset export CLI
//!
//! Runs one entry point against the Blockfrost API and writes its output
//! file, then logs a summary of the run.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cardano_asset_export::blockfrost::BlockfrostClient;
use cardano_asset_export::config::{ApiConfig, Flatten, OutputFormat, RunConfig};
use cardano_asset_export::export::{output_path, render, write_output};
use cardano_asset_export::fetch_assets::collect_assets;
use cardano_asset_export::fetch_transactions::collect_addresses;
use cardano_asset_export::pagination::PagedFetcher;
use cardano_asset_export::schemas::{AssetField, Record, RunSummary, TransactionField};

const ASSETS_ENTRY: &str = "assets";
const TRANSACTIONS_ENTRY: &str = "transactions";

#[derive(Parser)]
#[command(name = "cardano-asset-export")]
#[command(version)]
#[command(about = "Export Cardano NFT and address data from Blockfrost", long_about = None)]
struct Cli {
    /// Path to a TOML settings file (optional, uses env vars if not provided)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Directory holding the run configurations
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Output directory for exported files
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Exit with an error if any item failed
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich the assets of a policy or an explicit asset list
    Assets {
        /// Run configuration name (configuration/assets/<name>.json)
        name: String,
    },

    /// Collect payments received by a list of addresses
    Transactions {
        /// Run configuration name (configuration/transactions/<name>.json)
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Load configuration
    let mut config = match &cli.settings {
        Some(path) => ApiConfig::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => ApiConfig::load().context("Failed to load settings from environment")?,
    };
    if let Some(dir) = &cli.config_dir {
        config.paths.configuration_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }

    let client = BlockfrostClient::new(&config).context("Failed to build Blockfrost client")?;
    let fetcher = PagedFetcher::new(Duration::from_millis(config.rate_limits.page_cooldown_ms));

    let started = Instant::now();
    let run = async {
        match &cli.command {
            Commands::Assets { name } => cmd_assets(&config, &client, &fetcher, name).await,
            Commands::Transactions { name } => {
                cmd_transactions(&config, &client, &fetcher, name).await
            }
        }
    };
    let mut summary = run_until_cancelled(run, config.rate_limits.run_timeout_secs).await?;
    summary.elapsed_seconds = started.elapsed().as_secs();

    info!("ran in {} seconds", summary.elapsed_seconds);
    info!("finished - {}", serde_json::to_string(&summary)?);

    if summary.has_failures() {
        warn!("{} item steps failed", summary.failures.len());
        if cli.strict {
            anyhow::bail!(
                "{} failures recorded (strict mode)",
                summary.failures.len()
            );
        }
    }

    Ok(())
}

/// Drive a run to completion unless Ctrl-C or the run deadline comes first
async fn run_until_cancelled<F>(run: F, timeout_secs: Option<u64>) -> Result<RunSummary>
where
    F: Future<Output = Result<RunSummary>>,
{
    let deadline = async {
        match timeout_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Run cancelled"),
        _ = deadline => anyhow::bail!(
            "Run exceeded its deadline of {} seconds",
            timeout_secs.unwrap_or_default()
        ),
    }
}

async fn cmd_assets(
    config: &ApiConfig,
    client: &BlockfrostClient,
    fetcher: &PagedFetcher,
    name: &str,
) -> Result<RunSummary> {
    info!("=== Exporting assets ({}) ===", name);

    let run = RunConfig::<AssetField>::load(&config.paths.configuration_dir, ASSETS_ENTRY, name)?;
    let (records, mut summary) = collect_assets(client, fetcher, &run)
        .await
        .context("Failed to collect assets")?;

    let exported = export(config, ASSETS_ENTRY, name, &records, run.format, run.flatten.as_ref());
    settle_export(&mut summary, exported)?;
    Ok(summary)
}

async fn cmd_transactions(
    config: &ApiConfig,
    client: &BlockfrostClient,
    fetcher: &PagedFetcher,
    name: &str,
) -> Result<RunSummary> {
    info!("=== Exporting address transactions ({}) ===", name);

    let run = RunConfig::<TransactionField>::load(
        &config.paths.configuration_dir,
        TRANSACTIONS_ENTRY,
        name,
    )?;
    let (records, mut summary) = collect_addresses(client, fetcher, &run)
        .await
        .context("Failed to collect address transactions")?;

    let exported = export(
        config,
        TRANSACTIONS_ENTRY,
        name,
        &records,
        run.format,
        run.flatten.as_ref(),
    );
    settle_export(&mut summary, exported)?;
    Ok(summary)
}

/// Record the number of exported items. A failed export still reports the
/// run summary before the error is propagated.
fn settle_export(summary: &mut RunSummary, exported: Result<usize>) -> Result<()> {
    match exported {
        Ok(count) => {
            summary.exported = count;
            Ok(())
        }
        Err(e) => {
            warn!(
                "export failed - {}",
                serde_json::to_string(summary).unwrap_or_default()
            );
            for failure in &summary.failures {
                warn!("{} {}: {}", failure.item, failure.step, failure.error);
            }
            Err(e.context(format!(
                "Export failed after processing {} items ({} item failures)",
                summary.processed,
                summary.failures.len()
            )))
        }
    }
}

fn export<R: Record>(
    config: &ApiConfig,
    entry: &str,
    name: &str,
    records: &[R],
    format: OutputFormat,
    flatten: Option<&Flatten<R::Field>>,
) -> Result<usize> {
    let bytes = render(records, format, flatten).context("Failed to render output")?;
    let dir = config.ensure_output_dir(entry)?;
    let path = output_path(&dir, name, format);
    write_output(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(records.len())
}
