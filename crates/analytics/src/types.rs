use core_types::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Optional narrowing of the closed-trade set before metrics are
/// computed: by symbol and/or by an exit-time range.
#[derive(Debug, Clone, Default)]
pub struct MetricsQuery {
    pub symbol: Option<Symbol>,
    /// Inclusive lower bound on exit time, epoch milliseconds.
    pub from_ms: Option<i64>,
    /// Exclusive upper bound on exit time, epoch milliseconds.
    pub to_ms: Option<i64>,
}

/// Aggregate performance statistics over a set of closed trades and an
/// equity curve. Always recomputed from scratch, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformanceMetrics {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Winners over total, in percent.
    pub win_rate: f64,

    pub gross_profit: Decimal,
    /// Sum of losing trades, reported as a positive magnitude.
    pub gross_loss: Decimal,
    pub net_profit: Decimal,

    pub average_win: Decimal,
    pub average_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,

    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,

    /// Gross profit over gross loss. 0 with no wins and no losses;
    /// `f64::INFINITY` with profit and no losses.
    pub profit_factor: f64,

    pub max_drawdown_absolute: Decimal,
    pub max_drawdown_percent: f64,

    /// Mean periodic equity return over its standard deviation, scaled
    /// by the engine's annualization factor. 0 when variance is zero.
    pub sharpe_ratio: f64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}
