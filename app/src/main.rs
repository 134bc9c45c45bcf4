use anyhow::{Context, Result};
use app_config::Settings;
use backtester::{Backtester, print_report};
use clap::{Parser, Subcommand};
use core_types::{AccountId, Bar, Signal, Symbol};
use engine::Engine;
use events::EngineEvent;
use std::path::PathBuf;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

mod sweep;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Forex position risk governor and simulation engine.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the live trading engine against the terminal bridge.
    Run,

    /// Replays a historical bar file through the full trading pipeline.
    Backtest {
        /// The symbol to replay (must have a spec in config/base.toml).
        #[arg(short, long)]
        symbol: String,

        /// Path to a JSON array of bars, sorted by open time.
        #[arg(long)]
        bars: PathBuf,

        /// Path to a JSON array of signals, sorted by timestamp.
        #[arg(long)]
        signals: Option<PathBuf>,
    },

    /// Runs a risk-parameter sweep over a historical bar file.
    Sweep {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        bars: PathBuf,

        #[arg(long)]
        signals: Option<PathBuf>,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = app_config::load_settings().context("Failed to load settings")?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.app.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    tracing::info!(environment = %settings.app.environment, "Starting risk governor.");

    match cli.command {
        Commands::Run => run_live(settings).await?,
        Commands::Backtest {
            symbol,
            bars,
            signals,
        } => run_backtest(&settings, &symbol, &bars, signals.as_deref()).await?,
        Commands::Sweep {
            symbol,
            bars,
            signals,
        } => {
            let bars = load_bars(&bars)?;
            let signals = signals.as_deref().map(load_signals).transpose()?.unwrap_or_default();
            sweep::run_sweep(&settings, &Symbol(symbol), &bars, &signals)?;
        }
    }

    Ok(())
}

async fn run_live(settings: Settings) -> Result<()> {
    let accounts = app_config::load_accounts().context("Failed to load config/accounts.toml")?;

    let (events_tx, _) = broadcast::channel::<EngineEvent>(1024);
    let mut events_rx = events_tx.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            tracing::debug!(event = ?event, "Engine event.");
        }
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, stopping trading tasks.");
            let _ = stop_tx.send(true);
        }
    });

    Engine::new(settings, accounts, events_tx).run(stop_rx).await
}

async fn run_backtest(
    settings: &Settings,
    symbol: &str,
    bars_path: &std::path::Path,
    signals_path: Option<&std::path::Path>,
) -> Result<()> {
    let symbol = Symbol(symbol.to_string());
    let spec = settings.symbol_spec(&symbol)?;
    let simulation = settings
        .simulation
        .clone()
        .context("Backtests need a [simulation] section in config")?;

    let bars = load_bars(bars_path)?;
    let signals = signals_path.map(load_signals).transpose()?.unwrap_or_default();
    tracing::info!(
        symbol = %symbol,
        bars = bars.len(),
        signals = signals.len(),
        "Starting backtest."
    );

    let mut backtester = Backtester::new(
        AccountId(0),
        spec,
        settings.risk.clone(),
        settings.lifecycle.clone(),
        simulation,
    );
    let report = backtester.run(&bars, &signals).await?;
    print_report(&report);
    Ok(())
}

fn load_bars(path: &std::path::Path) -> Result<Vec<Bar>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bar file {}", path.display()))?;
    let bars: Vec<Bar> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bar file {}", path.display()))?;
    anyhow::ensure!(
        bars.windows(2).all(|w| w[0].open_time <= w[1].open_time),
        "Bar file {} is not sorted by open time",
        path.display()
    );
    Ok(bars)
}

fn load_signals(path: &std::path::Path) -> Result<Vec<Signal>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read signal file {}", path.display()))?;
    let signals: Vec<Signal> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse signal file {}", path.display()))?;
    anyhow::ensure!(
        signals.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms),
        "Signal file {} is not sorted by timestamp",
        path.display()
    );
    Ok(signals)
}
