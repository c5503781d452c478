//! Aegis Sentinel - Mempool Threat Detection and Protective Execution

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use aegis_sentinel::adapters::{
    FileTargetStore, FileTransactionCache, PaperBlockhashSource, PaperTransactionSender,
    RpcTransactionFetcher, WsLogStream,
};
use aegis_sentinel::config::{load_config, Config};
use aegis_sentinel::decoders::DecoderRegistry;
use aegis_sentinel::domain::AnalyzerConfig;
use aegis_sentinel::events::EventBus;
use aegis_sentinel::executor::FrontrunnerService;
use aegis_sentinel::monitor::MempoolMonitor;
use aegis_sentinel::ports::{BlockhashSource, TargetStore, TransactionSender};

#[derive(Parser)]
#[command(name = "aegis-sentinel", version, about = "Mempool threat sentinel for Solana tokens")]
struct CliApp {
    /// Log at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the detection and protection pipeline
    Run(RunCmd),
    /// Show the configured watch list
    Status(StatusCmd),
    /// Fetch a pool account and print its decoded metadata
    InspectPool(InspectPoolCmd),
}

#[derive(Args)]
struct RunCmd {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Paper mode: confirm protective sends locally, never hit the
    /// network submission path
    #[arg(long)]
    paper: bool,
}

#[derive(Args)]
struct StatusCmd {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Args)]
struct InspectPoolCmd {
    /// Pool account address
    pool: String,

    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets and endpoint overrides come from .env, not config.toml
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug);

    match app.command {
        Command::Run(cmd) => run_command(cmd).await,
        Command::Status(cmd) => status_command(cmd).await,
        Command::InspectPool(cmd) => inspect_pool_command(cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).init();
}

fn load_config_or_default(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        load_config(path).with_context(|| format!("Failed to load configuration from {path}"))
    } else {
        tracing::warn!(path, "Config file not found, using defaults");
        Ok(Config::default())
    }
}

async fn run_command(cmd: RunCmd) -> Result<()> {
    let config = load_config_or_default(&cmd.config)?;
    tracing::info!("Starting aegis-sentinel...");

    let bus = EventBus::default();
    let store: Arc<dyn TargetStore> = Arc::new(FileTargetStore::new(
        &config.store.targets_path,
        &config.store.alerts_path,
    ));
    let cache = Arc::new(FileTransactionCache::new(&config.store.tx_cache_dir));
    let stream = Arc::new(WsLogStream::new(
        config.endpoints.get_ws_url(),
        config.endpoints.commitment.clone(),
    ));
    let fetcher = Arc::new(RpcTransactionFetcher::new(
        config.endpoints.get_rpc_url(),
        config.endpoints.commitment.clone(),
    ));

    // Live RPC submission is provisioned separately; the paper sender
    // is the only submission path wired here
    check_submission_mode(cmd.paper)?;
    tracing::warn!("PAPER MODE - protective sends are confirmed locally");
    let sender: Arc<dyn TransactionSender> = Arc::new(PaperTransactionSender::new());
    let blockhash: Arc<dyn BlockhashSource> = Arc::new(PaperBlockhashSource::new());

    let executor = FrontrunnerService::new(
        config.execution.clone(),
        cache,
        sender,
        blockhash,
        bus.clone(),
    );
    executor.start();

    let monitor = Arc::new(MempoolMonitor::new(
        config.monitor.clone(),
        config.filters.clone(),
        AnalyzerConfig {
            large_sell_lamports: config.pricing.large_sell_lamports,
        },
        stream,
        fetcher,
        Arc::clone(&store),
        bus.clone(),
    ));
    monitor.start().await.context("Failed to start monitor")?;

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Shutdown signal received");
    monitor.stop().await.ok();
    executor.stop();
    tracing::info!("aegis-sentinel stopped");
    Ok(())
}

/// No live sender is wired; a run must opt into paper mode explicitly
/// instead of silently confirming sends locally
fn check_submission_mode(paper: bool) -> Result<()> {
    if paper {
        Ok(())
    } else {
        anyhow::bail!(
            "live transaction submission is not wired; pass --paper to run with locally confirmed sends"
        )
    }
}

async fn status_command(cmd: StatusCmd) -> Result<()> {
    let config = load_config_or_default(&cmd.config)?;
    let store = FileTargetStore::new(&config.store.targets_path, &config.store.alerts_path);
    let targets = store.load_active().await?;

    println!("Protected targets: {}", targets.len());
    for target in targets {
        println!(
            "  {} wallet={} token={} threshold={:?} fee_multiplier={}",
            target.id,
            target.wallet_address,
            target.token_mint,
            target.risk_threshold,
            target.priority_fee_multiplier
        );
    }
    Ok(())
}

async fn inspect_pool_command(cmd: InspectPoolCmd) -> Result<()> {
    let config = load_config_or_default(&cmd.config)?;
    let fetcher = RpcTransactionFetcher::new(
        config.endpoints.get_rpc_url(),
        config.endpoints.commitment.clone(),
    );
    let registry = DecoderRegistry::with_default_decoders(config.pricing.sol_price_usd);

    let (account, owner) = fetcher
        .fetch_account(&cmd.pool)
        .await
        .with_context(|| format!("Failed to fetch pool account {}", cmd.pool))?;
    let metadata = registry.decode(&account, &cmd.pool, Some(&owner));

    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_requires_explicit_paper_mode() {
        assert!(check_submission_mode(true).is_ok());
        assert!(check_submission_mode(false).is_err());
    }
}
