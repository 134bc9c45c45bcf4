pub mod error;

use analytics::{AnalyticsEngine, PerformanceMetrics};
use core_types::{
    AccountId, Bar, EquitySample, ExitReason, Signal, SymbolSpec, TradeRecord,
};
use execution::{ExecutionBackend, SimulatedExecutor, SimulationSettings};
use governor::PositionGovernor;
use lifecycle::{LifecycleManager, LifecycleSettings, PriceView};
use risk::{RiskProfile, RiskSizer};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use error::{Error, Result};

/// The outcome of one replay: the metrics plus the raw series they were
/// computed from, so callers can persist or re-slice them.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub metrics: PerformanceMetrics,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquitySample>,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
}

/// Replays a historical bar stream through the exact governor and
/// lifecycle logic live trading uses, against the simulated backend.
///
/// The replay is fully deterministic: all timestamps come from the bars,
/// the governor's clock is the bar time, and the fill model has no
/// random component. Two runs over the same inputs produce identical
/// trade logs.
pub struct Backtester {
    account: AccountId,
    governor: PositionGovernor,
    lifecycle: LifecycleManager,
    executor: SimulatedExecutor,
    initial_balance: Decimal,
}

impl Backtester {
    pub fn new(
        account: AccountId,
        spec: SymbolSpec,
        profile: RiskProfile,
        lifecycle_settings: LifecycleSettings,
        simulation: SimulationSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let initial_balance = simulation.initial_balance;
        Self {
            account,
            governor: PositionGovernor::new(account, RiskSizer::new(spec.clone(), profile)),
            lifecycle: LifecycleManager::new(spec.clone(), lifecycle_settings),
            executor: SimulatedExecutor::new(simulation, spec, events),
            initial_balance,
        }
    }

    /// Runs the replay over `bars`, feeding `signals` (sorted by
    /// timestamp) to the governor as their bars arrive.
    ///
    /// Per bar: protective sweep first, then signal admission, then one
    /// equity sample. Positions still open at the end of the stream are
    /// flattened at the last bar's close.
    pub async fn run(&mut self, bars: &[Bar], signals: &[Signal]) -> Result<BacktestReport> {
        if bars.is_empty() {
            return Err(Error::EmptyReplay);
        }

        let mut cursor = 0usize;
        for bar in bars {
            self.executor.set_bar(bar.clone()).await;

            let view = PriceView {
                current: bar.close,
                high: bar.high,
                low: bar.low,
            };
            self.lifecycle
                .sweep(&self.executor, self.account, &view)
                .await?;

            while cursor < signals.len() && signals[cursor].timestamp_ms <= bar.open_time {
                let signal = &signals[cursor];
                cursor += 1;
                match self
                    .governor
                    .admit(&self.executor, signal, bar.open_time)
                    .await
                {
                    Ok(position) => {
                        debug!(ticket = position.ticket, symbol = %position.symbol, "Signal admitted.");
                    }
                    Err(e) if e.is_policy_rejection() => {
                        debug!(symbol = %signal.symbol, reason = %e, "Signal rejected by policy.");
                    }
                    Err(governor::Error::Execution(execution::Error::OrderRejected {
                        reason,
                    })) => {
                        warn!(symbol = %signal.symbol, reason, "Order rejected by the simulated venue.");
                    }
                    Err(governor::Error::Invariant(e)) => return Err(e.into()),
                    Err(e) => return Err(Error::Admission(e)),
                }
            }

            self.executor.sample_equity().await?;
        }

        self.flatten().await?;

        let (trades, equity_curve, final_balance) = self.executor.results().await;
        let metrics =
            AnalyticsEngine::new().calculate(self.initial_balance, &trades, &equity_curve);
        info!(
            trades = trades.len(),
            final_balance = %final_balance,
            "Replay finished."
        );
        Ok(BacktestReport {
            metrics,
            trades,
            equity_curve,
            initial_balance: self.initial_balance,
            final_balance,
        })
    }

    /// Market-closes everything still open at the end of the stream, so
    /// the trade log and final balance account for the full replay.
    async fn flatten(&self) -> Result<()> {
        let open = self.executor.open_positions(self.account).await?;
        for position in open {
            self.executor
                .close_position(
                    self.account,
                    position.ticket,
                    position.volume,
                    None,
                    ExitReason::Manual,
                )
                .await?;
        }
        Ok(())
    }
}

/// Prints the report in a fixed-width console format.
pub fn print_report(report: &BacktestReport) {
    let m = &report.metrics;
    println!("\n--- Backtest Performance Report ---");
    println!("-----------------------------------");
    println!(
        "Net Profit:            ${:.2}",
        m.net_profit.to_f64().unwrap_or(0.0)
    );
    println!(
        "Final Balance:         ${:.2}",
        report.final_balance.to_f64().unwrap_or(0.0)
    );
    println!(
        "Max Drawdown:          ${:.2} ({:.2}%)",
        m.max_drawdown_absolute.to_f64().unwrap_or(0.0),
        m.max_drawdown_percent
    );
    println!("Sharpe Ratio:          {:.3}", m.sharpe_ratio);
    println!("Profit Factor:         {:.2}", m.profit_factor);
    println!("Win Rate:              {:.2}%", m.win_rate);
    println!(
        "Total Trades:          {} ({} wins / {} losses)",
        m.total_trades, m.winning_trades, m.losing_trades
    );
    println!("-----------------------------------");
    println!(
        "Average Win:           ${:.2}",
        m.average_win.to_f64().unwrap_or(0.0)
    );
    println!(
        "Average Loss:          ${:.2}",
        m.average_loss.to_f64().unwrap_or(0.0)
    );
    println!(
        "Largest Win:           ${:.2}",
        m.largest_win.to_f64().unwrap_or(0.0)
    );
    println!(
        "Largest Loss:          ${:.2}",
        m.largest_loss.to_f64().unwrap_or(0.0)
    );
    println!(
        "Longest Streaks:       {} wins / {} losses",
        m.longest_win_streak, m.longest_loss_streak
    );
    println!("-----------------------------------");
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Direction, Symbol};
    use rust_decimal_macros::dec;

    fn spec() -> SymbolSpec {
        SymbolSpec {
            pip_size: dec!(0.0001),
            pip_value_per_lot: dec!(10),
            contract_size: dec!(100000),
            volume_min: dec!(0.01),
            volume_max: dec!(100),
            volume_step: dec!(0.01),
            margin_per_lot: dec!(1000),
            digits: 5,
        }
    }

    fn profile() -> RiskProfile {
        RiskProfile {
            risk_percent: dec!(1),
            stop_loss_pips: dec!(20),
            take_profit_pips: dec!(40),
            min_position_size: dec!(0.01),
            max_position_size: dec!(10),
            max_positions_per_direction: 2,
            max_symbol_positions: 4,
            max_account_positions: 10,
            stacking_risk_multiplier: dec!(1),
            cooldown_seconds: 0,
            portfolio_risk_percent_cap: dec!(1000),
        }
    }

    fn quiet_lifecycle() -> LifecycleSettings {
        LifecycleSettings {
            breakeven_trigger_pips: dec!(0),
            breakeven_offset_pips: dec!(0),
            trailing_start_pips: dec!(0),
            trailing_distance_pips: dec!(0),
            partial_closes: Vec::new(),
        }
    }

    fn simulation() -> SimulationSettings {
        SimulationSettings {
            slippage_pips: dec!(0.5),
            commission_per_lot: dec!(7),
            initial_balance: dec!(10000),
            max_concurrent_positions: 10,
        }
    }

    fn bar(open_time: i64, close: Decimal) -> Bar {
        Bar {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
        }
    }

    fn buy_signal(timestamp_ms: i64) -> Signal {
        Signal {
            symbol: Symbol("EURUSD".to_string()),
            direction: Direction::Buy,
            reference_price: dec!(1.1000),
            confidence: 0.8,
            timestamp_ms,
            source_id: "test".to_string(),
        }
    }

    fn backtester() -> Backtester {
        Backtester::new(
            AccountId(1),
            spec(),
            profile(),
            quiet_lifecycle(),
            simulation(),
        )
    }

    #[tokio::test]
    async fn empty_bar_stream_is_an_error() {
        let mut bt = backtester();
        let err = bt.run(&[], &[]).await.unwrap_err();
        assert!(matches!(err, Error::EmptyReplay));
    }

    #[tokio::test]
    async fn stop_loss_fills_at_the_trigger_level_not_bar_close() {
        let bars = vec![
            bar(0, dec!(1.1000)),
            Bar {
                open_time: 60_000,
                open: dec!(1.0998),
                high: dec!(1.1002),
                low: dec!(1.0970), // crosses the 1.0980 stop
                close: dec!(1.0990),
                volume: dec!(1000),
            },
        ];
        let mut bt = backtester();
        let report = bt.run(&bars, &[buy_signal(0)]).await.unwrap();

        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, dec!(1.0980));
        // 1% of 10,000 over a 20-pip stop at $10/pip sizes 0.50 lots.
        assert_eq!(trade.volume, dec!(0.50));
    }

    #[tokio::test]
    async fn still_open_positions_are_flattened_at_stream_end() {
        let bars = vec![bar(0, dec!(1.1000)), bar(60_000, dec!(1.1010))];
        let mut bt = backtester();
        let report = bt.run(&bars, &[buy_signal(0)]).await.unwrap();

        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].exit_reason, ExitReason::Manual);
        assert_eq!(report.metrics.total_trades, 1);
    }

    #[tokio::test]
    async fn policy_rejections_do_not_abort_the_replay() {
        let mut profile = profile();
        profile.cooldown_seconds = 60;
        let mut bt = Backtester::new(
            AccountId(1),
            spec(),
            profile,
            quiet_lifecycle(),
            simulation(),
        );

        // Two same-bar signals: the second lands inside the cooldown.
        let bars = vec![bar(0, dec!(1.1000)), bar(60_000, dec!(1.1010))];
        let report = bt
            .run(&bars, &[buy_signal(0), buy_signal(0)])
            .await
            .unwrap();

        assert_eq!(report.trades.len(), 1);
    }

    #[tokio::test]
    async fn one_equity_sample_per_bar() {
        let bars = vec![
            bar(0, dec!(1.1000)),
            bar(60_000, dec!(1.1005)),
            bar(120_000, dec!(1.1010)),
        ];
        let mut bt = backtester();
        let report = bt.run(&bars, &[]).await.unwrap();
        assert_eq!(report.equity_curve.len(), 3);
        assert_eq!(report.final_balance, dec!(10000));
    }

    #[tokio::test]
    async fn identical_inputs_produce_identical_trade_logs() {
        let bars = vec![
            bar(0, dec!(1.1000)),
            bar(60_000, dec!(1.1015)),
            bar(120_000, dec!(1.1032)),
            Bar {
                open_time: 180_000,
                open: dec!(1.1030),
                high: dec!(1.1045), // crosses the 1.1040 target
                low: dec!(1.1028),
                close: dec!(1.1038),
                volume: dec!(1000),
            },
        ];
        let signals = vec![buy_signal(0), buy_signal(60_000)];

        let first = backtester().run(&bars, &signals).await.unwrap();
        let second = backtester().run(&bars, &signals).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first.trades).unwrap(),
            serde_json::to_string(&second.trades).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.equity_curve).unwrap(),
            serde_json::to_string(&second.equity_curve).unwrap()
        );
        assert_eq!(first.final_balance, second.final_balance);
    }
}
