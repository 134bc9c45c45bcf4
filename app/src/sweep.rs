use anyhow::{Context, Result};
use app_config::Settings;
use backtester::Backtester;
use core_types::{AccountId, Bar, Signal, Symbol};
use itertools::iproduct;
use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

// --- Structs for deserializing config/sweep.toml ---

#[derive(Deserialize, Debug)]
pub struct SweepConfig {
    /// How many ranked rows to print.
    #[serde(default = "default_top")]
    pub top: usize,
    pub risk_percent: ParamRange,
    pub stop_loss_pips: ParamRange,
    pub take_profit_pips: ParamRange,
}

#[derive(Deserialize, Debug)]
pub struct ParamRange {
    pub start: Decimal,
    pub end: Decimal,
    pub step: Decimal,
}

impl ParamRange {
    fn expand(&self) -> Result<Vec<Decimal>> {
        anyhow::ensure!(self.step > Decimal::ZERO, "sweep step must be positive");
        let mut values = vec![];
        let mut value = self.start;
        while value <= self.end {
            values.push(value);
            value += self.step;
        }
        anyhow::ensure!(!values.is_empty(), "sweep range is empty");
        Ok(values)
    }
}

fn default_top() -> usize {
    10
}

pub struct RankedResult {
    pub risk_percent: Decimal,
    pub stop_loss_pips: Decimal,
    pub take_profit_pips: Decimal,
    pub net_profit: Decimal,
    pub max_drawdown_percent: f64,
    pub profit_factor: f64,
    pub trades: u32,
}

fn load_sweep_config() -> Result<SweepConfig> {
    let content = std::fs::read_to_string("config/sweep.toml")
        .context("Failed to read config/sweep.toml")?;
    toml::from_str(&content).context("Failed to parse sweep.toml")
}

/// Runs one backtest per parameter combination across all cores, then
/// prints the results ranked by net profit.
pub fn run_sweep(
    settings: &Settings,
    symbol: &Symbol,
    bars: &[Bar],
    signals: &[Signal],
) -> Result<()> {
    let config = load_sweep_config()?;
    let spec = settings.symbol_spec(symbol)?;
    let simulation = settings
        .simulation
        .clone()
        .context("Sweeps need a [simulation] section in config")?;

    let combos: Vec<(Decimal, Decimal, Decimal)> = iproduct!(
        config.risk_percent.expand()?,
        config.stop_loss_pips.expand()?,
        config.take_profit_pips.expand()?
    )
    .collect();
    tracing::info!(combos = combos.len(), "Starting parameter sweep.");

    let mut results: Vec<RankedResult> = combos
        .par_iter()
        .map(|(risk_percent, stop_loss_pips, take_profit_pips)| -> Result<RankedResult> {
            let mut profile = settings.risk.clone();
            profile.risk_percent = *risk_percent;
            profile.stop_loss_pips = *stop_loss_pips;
            profile.take_profit_pips = *take_profit_pips;

            let mut backtester = Backtester::new(
                AccountId(0),
                spec.clone(),
                profile,
                settings.lifecycle.clone(),
                simulation.clone(),
            );

            // Each worker gets its own single-threaded runtime; the
            // replay itself never blocks on IO.
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            let report = runtime.block_on(backtester.run(bars, signals))?;

            Ok(RankedResult {
                risk_percent: *risk_percent,
                stop_loss_pips: *stop_loss_pips,
                take_profit_pips: *take_profit_pips,
                net_profit: report.metrics.net_profit,
                max_drawdown_percent: report.metrics.max_drawdown_percent,
                profit_factor: report.metrics.profit_factor,
                trades: report.metrics.total_trades,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    results.sort_by(|a, b| b.net_profit.cmp(&a.net_profit));
    print_ranked(&results, config.top);
    Ok(())
}

fn print_ranked(results: &[RankedResult], top: usize) {
    println!("\n--- Parameter Sweep Results (top {top}) ---");
    println!(
        "{:>6} | {:>8} | {:>8} | {:>12} | {:>8} | {:>8} | {:>6}",
        "risk%", "SL pips", "TP pips", "net profit", "max DD%", "PF", "trades"
    );
    for result in results.iter().take(top) {
        println!(
            "{:>6} | {:>8} | {:>8} | {:>12.2} | {:>8.2} | {:>8.2} | {:>6}",
            result.risk_percent,
            result.stop_loss_pips,
            result.take_profit_pips,
            result.net_profit.to_f64().unwrap_or(0.0),
            result.max_drawdown_percent,
            result.profit_factor,
            result.trades,
        );
    }
}
