use rust_decimal::Decimal;
use serde::Deserialize;

/// Per-account/symbol risk configuration.
///
/// Read-only during a trading cycle; the governor and sizer only ever
/// borrow it.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskProfile {
    /// Percent of balance to lose if the stop-loss is hit (e.g. 1.0 = 1%).
    pub risk_percent: Decimal,
    /// Stop-loss distance from entry, in pips.
    pub stop_loss_pips: Decimal,
    /// Take-profit distance from entry, in pips. Zero disables the TP.
    #[serde(default)]
    pub take_profit_pips: Decimal,
    /// Lower bound on sized volume, on top of the broker minimum.
    #[serde(default)]
    pub min_position_size: Decimal,
    /// Upper bound on sized volume, on top of the broker maximum.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    /// How many positions may stack in the same direction on one symbol.
    /// 1 means stacking is disabled.
    #[serde(default = "default_one")]
    pub max_positions_per_direction: u32,
    /// Cap on open positions for the symbol, both directions combined.
    #[serde(default = "default_max_symbol_positions")]
    pub max_symbol_positions: u32,
    /// Cap on open positions across the whole account.
    #[serde(default = "default_max_account_positions")]
    pub max_account_positions: u32,
    /// Risk multiplier applied per stack level: entry at stack index `i`
    /// risks `risk_percent * multiplier^i`.
    #[serde(default = "default_stacking_multiplier")]
    pub stacking_risk_multiplier: Decimal,
    /// Minimum seconds between admitted openings for the symbol.
    #[serde(default)]
    pub cooldown_seconds: u64,
    /// Cap on total notional exposure as a percent of equity.
    #[serde(default = "default_portfolio_cap")]
    pub portfolio_risk_percent_cap: Decimal,
}

fn default_one() -> u32 {
    1
}

fn default_max_symbol_positions() -> u32 {
    4
}

fn default_max_account_positions() -> u32 {
    10
}

fn default_max_position_size() -> Decimal {
    Decimal::new(100, 0)
}

fn default_stacking_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_portfolio_cap() -> Decimal {
    Decimal::new(100, 0)
}
