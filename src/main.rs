//! Signal Bridge - Main Entry Point
//!
//! Receives parsed provider signals over TCP and runs them through the
//! configured strategies, each against its own brokerage account.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal_macros::dec;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use signal_bridge::bridge::{read_commands, BridgeService, Dispatcher, TcpSignalSource};
use signal_bridge::broker::PaperBroker;
use signal_bridge::common::channels::{create_shutdown_channel, create_signal_channel};
use signal_bridge::common::traits::{BrokerGateway, SignalSource};
use signal_bridge::config::{load_config, AppConfig};
use signal_bridge::oanda::OandaRestClient;
use signal_bridge::strategy::{
    BoxedEngine, CopyEngine, PairStateStore, ReverseEngine, SmartCopyEngine, TieredStopPromoter,
};

/// Starting balance of each simulated account in dry-run mode
const PAPER_BALANCE: rust_decimal::Decimal = dec!(10000);

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Trade against in-memory paper accounts instead of Oanda
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Gateway for one strategy, or `None` when the strategy is not configured
fn gateway_for(
    config: &AppConfig,
    account_id: Option<&String>,
    dry_run: bool,
) -> Result<Option<Arc<dyn BrokerGateway>>> {
    if dry_run {
        return Ok(Some(Arc::new(PaperBroker::with_seed_prices(PAPER_BALANCE))));
    }
    match account_id {
        Some(id) => Ok(Some(Arc::new(OandaRestClient::from_config(&config.broker, id)?))),
        None => Ok(None),
    }
}

fn load_store(state_dir: &Path, file: &str) -> Result<PairStateStore> {
    let path = state_dir.join(file);
    PairStateStore::load(&path).with_context(|| format!("loading state from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut config = load_config(Some(&args.config))?;
    if args.dry_run {
        config.settings.dry_run = true;
    }
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&level, args.json_logs || config.settings.json_logs)?;

    info!("Starting signal bridge");
    info!("Configuration file: {}", args.config);
    let dry_run = config.settings.dry_run;
    if dry_run {
        warn!("Dry run: trading against paper accounts");
    }

    let state_dir = config.settings.state_dir.clone();
    let mut engines: Vec<BoxedEngine> = Vec::new();
    let mut reverse: Option<Arc<ReverseEngine>> = None;
    let mut promoter: Option<TieredStopPromoter> = None;

    if let Some(gateway) = gateway_for(&config, config.copy.account_id.as_ref(), dry_run)? {
        engines.push(Arc::new(CopyEngine::new(
            config.copy.clone(),
            config.provider.clone(),
            gateway,
        )));
    }

    if let Some(gateway) = gateway_for(&config, config.smart_copy.account_id.as_ref(), dry_run)? {
        let store = load_store(&state_dir, &config.smart_copy.state_file)?;
        info!(strategy = SmartCopyEngine::NAME, "Loaded state: {}", store.summary());
        engines.push(Arc::new(SmartCopyEngine::new(
            config.smart_copy.clone(),
            config.provider.clone(),
            gateway,
            store.into_shared(),
        )));
    }

    if let Some(gateway) = gateway_for(&config, config.reverse.account_id.as_ref(), dry_run)? {
        let store = load_store(&state_dir, &config.reverse.state_file)?;
        info!(strategy = ReverseEngine::NAME, "Loaded state: {}", store.summary());
        let store = store.into_shared();
        let engine = Arc::new(ReverseEngine::new(
            config.reverse.clone(),
            config.provider.clone(),
            gateway.clone(),
            store.clone(),
        ));
        promoter = Some(TieredStopPromoter::new(config.reverse.clone(), gateway, store));
        engines.push(engine.clone());
        reverse = Some(engine);
    }

    if engines.is_empty() {
        warn!("No strategy has an account configured; signals will be logged only");
    }
    info!(strategies = engines.len(), "Strategies initialised");

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let shutdown_tx = Arc::new(shutdown_tx);
    let (signal_tx, signal_rx) = create_signal_channel();
    let (command_tx, command_rx) = mpsc::channel(16);

    let mut source = TcpSignalSource::new(config.settings.listen_addr.clone(), shutdown_rx.clone());
    tokio::spawn(async move {
        if let Err(e) = source.run(signal_tx).await {
            error!(source = source.source_name(), error = %e, "Signal source failed");
        }
    });

    let promoter_handle = promoter.map(|promoter| {
        let period = Duration::from_secs(config.reverse.promoter_interval_seconds);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { promoter.run(period, rx).await })
    });

    tokio::spawn(async move {
        if let Err(e) = read_commands(BufReader::new(tokio::io::stdin()), command_tx).await {
            warn!(error = %e, "Operator console failed");
        }
    });

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cleaning up...");
            let _ = ctrl_c_tx.send(true);
        }
    });

    let service = BridgeService::new(
        Dispatcher::new(engines, Duration::from_millis(config.settings.strategy_delay_ms)),
        reverse,
    );
    let outcome = service.run(signal_rx, command_rx, &shutdown_tx).await;

    if let Some(handle) = promoter_handle {
        let _ = handle.await;
    }
    let failures = service.dispatcher().persist_all().await;

    // stdin is read on a blocking thread that only returns on input, so
    // exit explicitly instead of waiting for runtime shutdown
    match outcome {
        Err(e) => {
            error!(error = %e, "Exiting after fatal error");
            std::process::exit(1);
        }
        Ok(()) if failures > 0 => {
            error!(failures, "Shut down with unsaved state");
            std::process::exit(1);
        }
        Ok(()) => {
            info!("Shutdown successfully");
            std::process::exit(0);
        }
    }
}
