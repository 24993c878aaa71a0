use anyhow::{bail, Context, Result};
use clap::Parser;
use closerts::adapters::FileSnapshotSource;
use closerts::cli::{Cli, Commands};
use closerts::config::AppConfig;
use closerts::exchange::{OrderGateway, PaperGateway};
use closerts::persistence::ActiveTradeStore;
use closerts::services::TimeFrameReplay;
use closerts::strategy::{ActiveTradeLedger, DecisionEngine};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{error, info, warn};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::CheckConfig => {
            init_logging_simple();
            check_config(&cli.config_dir)?;
        }
        Commands::Run {
            bars,
            snapshots,
            pace_ms,
        } => {
            let config = load_config(&cli.config_dir)?;
            init_logging(&config.logging);
            run_paper(config, bars, snapshots, *pace_ms)
                .await
                .context("paper run failed")?;
        }
    }

    Ok(())
}

fn load_config(dir: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from(dir)
        .with_context(|| format!("loading configuration from {}", dir.display()))?;
    if let Err(errors) = config.validate() {
        bail!("invalid configuration: {}", errors.join("; "));
    }
    Ok(config)
}

fn check_config(dir: &Path) -> Result<()> {
    let config = AppConfig::load_from(dir)
        .with_context(|| format!("loading configuration from {}", dir.display()))?;
    match config.validate() {
        Ok(()) => {
            println!(
                "Configuration OK: {} with {} instrument(s)",
                config.strategy.name,
                config.strategy.instruments.len()
            );
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                println!("  - {}", e);
            }
            bail!("{} configuration error(s)", errors.len())
        }
    }
}

async fn run_paper(config: AppConfig, bars: &Path, snapshots: &Path, pace_ms: u64) -> Result<()> {
    let strategy = &config.strategy;
    let store = ActiveTradeStore::new(&config.persistence.data_dir);

    let ledger = if strategy.load_active_trades {
        let trades = store.load(&strategy.name).await.with_context(|| {
            format!("reading {}", store.path_for(&strategy.name).display())
        })?;
        ActiveTradeLedger::with_trades(trades)
    } else {
        ActiveTradeLedger::new()
    };
    let autosave = store.spawn_autosave(&strategy.name, ledger.clone());

    let gateway = Arc::new(PaperGateway::new(config.paper.immediate_fill));
    let prices = Arc::new(FileSnapshotSource::new(snapshots));
    let engine = Arc::new(DecisionEngine::new(
        strategy,
        config.schedule.gate_schedule()?,
        ledger.clone(),
        prices,
        gateway.clone(),
    )?);
    engine.log_startup().await;

    let replay = TimeFrameReplay::from_file(bars)
        .await
        .with_context(|| format!("reading time frames from {}", bars.display()))?
        .with_pace(Duration::from_millis(pace_ms));

    // Subscribe before anything is submitted
    let updates = gateway.subscribe();
    let (frame_tx, frame_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let engine_task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(frame_rx, updates, shutdown_rx).await })
    };
    let replay_task = tokio::spawn(replay.run(Arc::clone(&gateway), frame_tx));

    tokio::select! {
        result = replay_task => match result {
            Ok(Ok(sent)) => info!("Replay finished after {} time frame(s)", sent),
            Ok(Err(e)) => error!("Replay failed: {}", e),
            Err(e) => error!("Replay task panicked: {}", e),
        },
        _ = shutdown_signal() => {
            warn!("Interrupted, stopping engine");
            let _ = shutdown_tx.send(true);
        }
    }

    engine_task.await.context("engine task panicked")??;

    autosave.abort();
    let trades = ledger.snapshot().await;
    store
        .save(&strategy.name, &trades)
        .await
        .context("saving active trades")?;

    let submitted = gateway.submitted().await;
    let mode = if engine.is_dry_run() { " (dry run)" } else { "" };
    println!("\n=== {} paper run{} ===", engine.name(), mode);
    println!("Orders submitted: {}", submitted.len());
    for order in &submitted {
        let status = gateway
            .order_status(&order.client_order_id)
            .await?
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  [{}] {} {} x {} @ {} {}",
            order.comment(),
            order.code,
            order.side.as_str(),
            order.volume,
            order.price,
            status
        );
    }
    println!("Active trades: {}", trades.len());
    for trade in &trades {
        println!("  {}", trade.code);
    }

    Ok(())
}
