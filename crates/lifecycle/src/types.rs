use core_types::{ExitReason, PositionStatus};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Protective-transition configuration for one account/symbol.
///
/// A zero trigger disables the corresponding feature.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleSettings {
    /// Unrealized profit, in pips, at which the stop moves to breakeven.
    #[serde(default)]
    pub breakeven_trigger_pips: Decimal,
    /// Offset from entry for the breakeven stop, in pips (positive locks
    /// in a small gain).
    #[serde(default)]
    pub breakeven_offset_pips: Decimal,
    /// Unrealized profit, in pips, at which the trailing stop engages.
    #[serde(default)]
    pub trailing_start_pips: Decimal,
    /// Distance the trailing stop keeps behind price, in pips.
    #[serde(default)]
    pub trailing_distance_pips: Decimal,
    /// Profit thresholds at which part of the position is taken off.
    /// Evaluated in order; each fires at most once per position.
    #[serde(default)]
    pub partial_closes: Vec<PartialCloseLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialCloseLevel {
    /// Unrealized profit, in pips, that arms this level.
    pub trigger_pips: Decimal,
    /// Percent of the *remaining* volume to close (e.g. 50.0).
    pub close_percent: Decimal,
}

/// The prices a lifecycle evaluation runs against.
///
/// Live mode uses the latest tick for all three; simulation uses the
/// bar close plus the bar's extremes so stop/target crossings inside
/// the bar are detected.
#[derive(Debug, Clone, Copy)]
pub struct PriceView {
    pub current: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl PriceView {
    /// A view where the extremes collapse onto the current price.
    pub fn tick(price: Decimal) -> Self {
        Self {
            current: price,
            high: price,
            low: price,
        }
    }
}

/// At most one of these is issued per position per cycle; success is
/// never assumed, the position is re-read next cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    /// Close the full remaining volume. `price` is the trigger level for
    /// protective exits, `None` for a market close.
    Close {
        price: Option<Decimal>,
        reason: ExitReason,
    },
    /// Close part of the volume at market.
    PartialClose { volume: Decimal },
    /// Rewrite the stop-loss (and lifecycle status with it).
    MoveStop {
        stop_loss: Decimal,
        status: PositionStatus,
    },
}
