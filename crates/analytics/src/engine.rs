use crate::types::{MetricsQuery, PerformanceMetrics};
use core_types::{EquitySample, TradeRecord};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// Computes performance metrics from closed trades and an equity curve.
///
/// Pure with respect to its inputs; both live trading and backtests feed
/// it the same record shapes, so the numbers are comparable.
pub struct AnalyticsEngine {
    /// Periods per year for Sharpe annualization; 1.0 leaves the ratio
    /// periodic.
    annualization_periods: f64,
}

impl Default for AnalyticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self {
            annualization_periods: 1.0,
        }
    }

    pub fn with_annualization(periods_per_year: f64) -> Self {
        Self {
            annualization_periods: periods_per_year,
        }
    }

    /// Narrows the trade set by symbol/date range, then computes metrics.
    pub fn calculate_for(
        &self,
        initial_balance: Decimal,
        trades: &[TradeRecord],
        equity_curve: &[EquitySample],
        query: &MetricsQuery,
    ) -> PerformanceMetrics {
        let filtered: Vec<TradeRecord> = trades
            .iter()
            .filter(|t| query.symbol.as_ref().is_none_or(|s| t.symbol == *s))
            .filter(|t| query.from_ms.is_none_or(|from| t.exit_time_ms >= from))
            .filter(|t| query.to_ms.is_none_or(|to| t.exit_time_ms < to))
            .cloned()
            .collect();
        // The equity curve is account-level, so only the date bounds apply;
        // drawdown and Sharpe then describe the same window as the trades.
        let curve: Vec<EquitySample> = equity_curve
            .iter()
            .filter(|s| query.from_ms.is_none_or(|from| s.timestamp_ms >= from))
            .filter(|s| query.to_ms.is_none_or(|to| s.timestamp_ms < to))
            .cloned()
            .collect();
        self.calculate(initial_balance, &filtered, &curve)
    }

    /// Computes the full metrics set.
    pub fn calculate(
        &self,
        initial_balance: Decimal,
        trades: &[TradeRecord],
        equity_curve: &[EquitySample],
    ) -> PerformanceMetrics {
        let mut metrics = PerformanceMetrics::new();

        // --- Trade statistics ---
        metrics.total_trades = trades.len() as u32;
        metrics.net_profit = trades.iter().map(|t| t.profit).sum();

        let wins: Vec<&TradeRecord> = trades.iter().filter(|t| t.profit > dec!(0)).collect();
        let losses: Vec<&TradeRecord> = trades.iter().filter(|t| t.profit < dec!(0)).collect();
        metrics.winning_trades = wins.len() as u32;
        metrics.losing_trades = losses.len() as u32;
        if metrics.total_trades > 0 {
            metrics.win_rate =
                (metrics.winning_trades as f64 / metrics.total_trades as f64) * 100.0;
        }

        metrics.gross_profit = wins.iter().map(|t| t.profit).sum();
        metrics.gross_loss = losses.iter().map(|t| t.profit).sum::<Decimal>().abs();

        if !wins.is_empty() {
            metrics.average_win = metrics.gross_profit / Decimal::from(wins.len());
            metrics.largest_win = wins.iter().map(|t| t.profit).max().unwrap_or_default();
        }
        if !losses.is_empty() {
            metrics.average_loss = (metrics.gross_loss / Decimal::from(losses.len())).abs();
            metrics.largest_loss = losses
                .iter()
                .map(|t| t.profit)
                .min()
                .unwrap_or_default()
                .abs();
        }

        // --- Streaks, in exit order ---
        let mut win_streak = 0u32;
        let mut loss_streak = 0u32;
        for trade in trades {
            if trade.profit > dec!(0) {
                win_streak += 1;
                loss_streak = 0;
            } else if trade.profit < dec!(0) {
                loss_streak += 1;
                win_streak = 0;
            } else {
                win_streak = 0;
                loss_streak = 0;
            }
            metrics.longest_win_streak = metrics.longest_win_streak.max(win_streak);
            metrics.longest_loss_streak = metrics.longest_loss_streak.max(loss_streak);
        }

        // --- Profit factor ---
        metrics.profit_factor = if metrics.gross_loss > dec!(0) {
            (metrics.gross_profit / metrics.gross_loss)
                .to_f64()
                .unwrap_or(0.0)
        } else if metrics.gross_profit > dec!(0) {
            f64::INFINITY // Profit with no losses.
        } else {
            0.0
        };

        // --- Max drawdown, peak to trough ---
        let mut peak = initial_balance;
        let mut max_drawdown = dec!(0);
        let mut max_drawdown_pct = 0.0f64;
        for sample in equity_curve {
            peak = peak.max(sample.equity);
            let drawdown = peak - sample.equity;
            max_drawdown = max_drawdown.max(drawdown);
            if peak > dec!(0) {
                let pct = (drawdown / peak).to_f64().unwrap_or(0.0) * 100.0;
                max_drawdown_pct = max_drawdown_pct.max(pct);
            }
        }
        metrics.max_drawdown_absolute = max_drawdown;
        metrics.max_drawdown_percent = max_drawdown_pct;

        // --- Sharpe over periodic equity returns ---
        if equity_curve.len() > 1 {
            let returns: Vec<f64> = equity_curve
                .windows(2)
                .filter(|w| w[0].equity > dec!(0))
                .map(|w| (w[1].equity / w[0].equity - dec!(1)).to_f64().unwrap_or(0.0))
                .collect();
            if !returns.is_empty() {
                let mean = returns.iter().sum::<f64>() / returns.len() as f64;
                let variance = returns.iter().map(|r| (*r - mean).powi(2)).sum::<f64>()
                    / returns.len() as f64;
                let std_dev = variance.sqrt();
                metrics.sharpe_ratio = if std_dev > 0.0 {
                    (mean / std_dev) * self.annualization_periods.sqrt()
                } else {
                    0.0
                };
            }
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AccountId, Direction, ExitReason, Symbol};

    fn trade(profit: Decimal, exit_time_ms: i64) -> TradeRecord {
        TradeRecord {
            ticket: 1,
            account: AccountId(1),
            symbol: Symbol("EURUSD".to_string()),
            direction: Direction::Buy,
            volume: dec!(0.5),
            entry_price: dec!(1.1000),
            entry_time_ms: 0,
            exit_price: dec!(1.1010),
            exit_time_ms,
            stop_loss: dec!(1.0980),
            take_profit: dec!(1.1040),
            profit,
            commission: dec!(0),
            stack_index: 0,
            exit_reason: ExitReason::TakeProfit,
            source_id: "test".to_string(),
        }
    }

    fn sample(timestamp_ms: i64, equity: Decimal) -> EquitySample {
        EquitySample {
            timestamp_ms,
            balance: equity,
            equity,
            unrealized_pnl: dec!(0),
            realized_pnl: dec!(0),
        }
    }

    #[test]
    fn counts_wins_losses_and_streaks() {
        let trades = vec![
            trade(dec!(100), 1),
            trade(dec!(50), 2),
            trade(dec!(-30), 3),
            trade(dec!(-20), 4),
            trade(dec!(-10), 5),
            trade(dec!(80), 6),
        ];
        let metrics = AnalyticsEngine::new().calculate(dec!(10000), &trades, &[]);

        assert_eq!(metrics.total_trades, 6);
        assert_eq!(metrics.winning_trades, 3);
        assert_eq!(metrics.losing_trades, 3);
        assert_eq!(metrics.win_rate, 50.0);
        assert_eq!(metrics.gross_profit, dec!(230));
        assert_eq!(metrics.gross_loss, dec!(60));
        assert_eq!(metrics.net_profit, dec!(170));
        assert_eq!(metrics.longest_win_streak, 2);
        assert_eq!(metrics.longest_loss_streak, 3);
        assert_eq!(metrics.largest_win, dec!(100));
        assert_eq!(metrics.largest_loss, dec!(30));
        assert_eq!(metrics.average_loss, dec!(20));
    }

    #[test]
    fn profit_factor_is_zero_with_no_wins_and_no_losses() {
        let metrics = AnalyticsEngine::new().calculate(dec!(10000), &[], &[]);
        assert_eq!(metrics.profit_factor, 0.0);

        // Breakeven-only trades count as neither.
        let trades = vec![trade(dec!(0), 1)];
        let metrics = AnalyticsEngine::new().calculate(dec!(10000), &trades, &[]);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn profit_factor_is_infinite_with_profit_and_no_losses() {
        let trades = vec![trade(dec!(100), 1), trade(dec!(40), 2)];
        let metrics = AnalyticsEngine::new().calculate(dec!(10000), &trades, &[]);
        assert!(metrics.profit_factor.is_infinite());
    }

    #[test]
    fn max_drawdown_is_the_largest_peak_to_trough_decline() {
        let curve = vec![
            sample(0, dec!(10000)),
            sample(1, dec!(10500)),
            sample(2, dec!(10200)),
            sample(3, dec!(9800)), // trough: 700 off the 10500 peak
            sample(4, dec!(10600)),
            sample(5, dec!(10400)),
        ];
        let metrics = AnalyticsEngine::new().calculate(dec!(10000), &[], &curve);
        assert_eq!(metrics.max_drawdown_absolute, dec!(700));
        let expected_pct = 700.0 / 10500.0 * 100.0;
        assert!((metrics.max_drawdown_percent - expected_pct).abs() < 1e-9);
    }

    #[test]
    fn sharpe_is_zero_when_variance_is_zero() {
        let curve = vec![
            sample(0, dec!(10000)),
            sample(1, dec!(10000)),
            sample(2, dec!(10000)),
        ];
        let metrics = AnalyticsEngine::new().calculate(dec!(10000), &[], &curve);
        assert_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn sharpe_is_positive_for_a_rising_curve_with_variance() {
        let curve = vec![
            sample(0, dec!(10000)),
            sample(1, dec!(10100)),
            sample(2, dec!(10150)),
            sample(3, dec!(10300)),
        ];
        let metrics = AnalyticsEngine::new().calculate(dec!(10000), &[], &curve);
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn query_filters_by_symbol_and_date_range() {
        let mut other = trade(dec!(100), 5);
        other.symbol = Symbol("GBPUSD".to_string());
        let trades = vec![trade(dec!(50), 1), trade(dec!(-20), 10), other];

        let engine = AnalyticsEngine::new();
        let query = MetricsQuery {
            symbol: Some(Symbol("EURUSD".to_string())),
            from_ms: Some(0),
            to_ms: Some(9),
        };
        let metrics = engine.calculate_for(dec!(10000), &trades, &[], &query);
        assert_eq!(metrics.total_trades, 1);
        assert_eq!(metrics.net_profit, dec!(50));
    }

    #[test]
    fn query_date_range_scopes_the_equity_curve() {
        let curve = vec![
            sample(1, dec!(10000)),
            sample(5, dec!(9900)),
            sample(12, dec!(9000)), // deep dip, outside the window
        ];

        let engine = AnalyticsEngine::new();
        let query = MetricsQuery {
            symbol: None,
            from_ms: Some(0),
            to_ms: Some(9),
        };
        let metrics = engine.calculate_for(dec!(10000), &[], &curve, &query);
        assert_eq!(metrics.max_drawdown_absolute, dec!(100));

        let unbounded = MetricsQuery {
            symbol: None,
            from_ms: None,
            to_ms: None,
        };
        let metrics = engine.calculate_for(dec!(10000), &[], &curve, &unbounded);
        assert_eq!(metrics.max_drawdown_absolute, dec!(1000));
    }
}
