use crate::types::RiskProfile;
use crate::{Error, Result};
use core_types::{AccountId, OrderRequest, Signal, SymbolSpec};
use rust_decimal::Decimal;

/// Converts a signal plus account state into a concrete, risk-bounded order.
///
/// The sizer is a pure function of its inputs: it never looks at open
/// positions, clocks or any other ambient state, so it is safe to call
/// repeatedly on retry and it is what makes simulated and live sizing
/// identical.
#[derive(Debug, Clone)]
pub struct RiskSizer {
    spec: SymbolSpec,
    profile: RiskProfile,
}

impl RiskSizer {
    pub fn new(spec: SymbolSpec, profile: RiskProfile) -> Self {
        Self { spec, profile }
    }

    pub fn profile(&self) -> &RiskProfile {
        &self.profile
    }

    pub fn spec(&self) -> &SymbolSpec {
        &self.spec
    }

    /// Sizes an order so that the monetary loss at the stop-loss equals
    /// `risk_percent` of `balance`, rounded down to the volume step.
    ///
    /// `risk_percent` is passed explicitly rather than read from the
    /// profile because stacked entries trade at scaled-down risk.
    pub fn size(
        &self,
        signal: &Signal,
        account: AccountId,
        balance: Decimal,
        risk_percent: Decimal,
        stack_index: u32,
    ) -> Result<OrderRequest> {
        if balance <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "balance must be positive, got {balance}"
            )));
        }
        if !(0.0..=1.0).contains(&signal.confidence) {
            return Err(Error::InvalidParameters(format!(
                "signal confidence out of range: {}",
                signal.confidence
            )));
        }

        let stop_pips = self.profile.stop_loss_pips;
        if stop_pips <= Decimal::ZERO {
            return Err(Error::NonPositiveStopDistance { pips: stop_pips });
        }

        // --- Derive stop-loss / take-profit prices from pip distances ---
        let sign = signal.direction.sign();
        let stop_loss = signal.reference_price - sign * stop_pips * self.spec.pip_size;
        let take_profit = if self.profile.take_profit_pips > Decimal::ZERO {
            signal.reference_price + sign * self.profile.take_profit_pips * self.spec.pip_size
        } else {
            Decimal::ZERO
        };

        // --- Volume from the monetary risk budget ---
        let risk_amount = balance * risk_percent / Decimal::ONE_HUNDRED;
        let loss_per_lot = stop_pips * self.spec.pip_value_per_lot;
        let raw_volume = risk_amount / loss_per_lot;

        let step = self.spec.volume_step;
        let floored = (raw_volume / step).floor() * step;
        if floored <= Decimal::ZERO {
            return Err(Error::VolumeRoundsToZero {
                risk_amount,
                loss_per_lot,
            });
        }

        let min_volume = self.spec.volume_min.max(self.profile.min_position_size);
        let max_volume = self.spec.volume_max.min(self.profile.max_position_size);
        let volume = floored.max(min_volume).min(max_volume);

        Ok(OrderRequest {
            account,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            volume,
            stop_loss,
            take_profit,
            stack_index,
            source_id: signal.source_id.clone(),
        })
    }
}
