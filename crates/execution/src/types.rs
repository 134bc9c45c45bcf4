use rust_decimal::Decimal;
use serde::Deserialize;

/// Fill-model parameters for the simulated backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    /// Adverse price offset applied to every fill, in pips.
    pub slippage_pips: Decimal,

    /// Flat round-turn commission per lot, charged on close fills.
    pub commission_per_lot: Decimal,

    /// Starting account balance.
    pub initial_balance: Decimal,

    /// Hard cap on simultaneously open simulated positions.
    pub max_concurrent_positions: u32,
}
