use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading symbol, e.g. "EURUSD".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A trading account identifier, as assigned by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The direction of a trade or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// The opposite direction, used when closing at market.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// +1 for Buy, -1 for Sell. Multiplies price distances into signed P/L.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Buy => Decimal::ONE,
            Direction::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// A trade intent produced by the (external) signal layer.
///
/// Signals are immutable and consumed exactly once by the risk sizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub direction: Direction,
    /// The price the signal was generated against.
    pub reference_price: Decimal,
    /// Source-reported confidence in [0, 1].
    pub confidence: f64,
    /// Signal generation time, epoch milliseconds.
    pub timestamp_ms: i64,
    /// Identifier of the producing strategy/source.
    pub source_id: String,
}

/// One OHLCV bar for a symbol/timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time, epoch milliseconds.
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// The broker contract specification for a symbol.
///
/// Everything the sizer needs to turn pip distances into prices and
/// a monetary risk budget into a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    /// Price increment of one pip (e.g. 0.0001 for EURUSD, 0.01 for USDJPY).
    pub pip_size: Decimal,
    /// Account-currency value of one pip for one standard lot.
    pub pip_value_per_lot: Decimal,
    /// Units of base currency per lot (typically 100_000).
    pub contract_size: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
    /// Margin the broker requires to hold one lot, in account currency.
    pub margin_per_lot: Decimal,
    /// Price decimal places, for display only.
    pub digits: u32,
}

/// The lifecycle state of a position.
///
/// States form a closed machine; `can_transition_to` is the single
/// source of truth for which edges exist. Anything outside the table
/// is a programming error, not a condition to tolerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Submitted, not yet acknowledged by the backend.
    Pending,
    Open,
    /// Stop-loss moved to breakeven; the move is one-shot.
    BreakevenArmed,
    /// Stop-loss is following price at a fixed distance.
    Trailing,
    /// Part of the volume has been taken off at a profit threshold.
    PartiallyClosed,
    Closed,
    /// Rejected by the governor before any order was sent.
    Rejected,
    /// Submission outcome could not be confirmed; awaiting reconciliation.
    Failed,
}

impl PositionStatus {
    /// Whether the position can accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionStatus::Closed | PositionStatus::Rejected | PositionStatus::Failed
        )
    }

    /// The transition table for the position state machine.
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        match (*self, next) {
            (Pending, Open) | (Pending, Rejected) | (Pending, Failed) => true,
            (Open, BreakevenArmed)
            | (Open, Trailing)
            | (Open, PartiallyClosed)
            | (Open, Closed)
            | (Open, Failed) => true,
            (BreakevenArmed, Trailing)
            | (BreakevenArmed, PartiallyClosed)
            | (BreakevenArmed, Closed) => true,
            (Trailing, PartiallyClosed) | (Trailing, Closed) => true,
            // Further partial closes keep the same state.
            (PartiallyClosed, PartiallyClosed) | (PartiallyClosed, Closed) => true,
            _ => false,
        }
    }
}

/// A single position, live or simulated.
///
/// Created by the governor on admission, mutated only by the lifecycle
/// manager and execution-backend acknowledgements. Terminal once
/// `Closed`, `Rejected` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// The backend-assigned ticket.
    pub ticket: u64,
    pub account: AccountId,
    pub symbol: Symbol,
    pub direction: Direction,
    /// Remaining open volume in lots.
    pub volume: Decimal,
    pub entry_price: Decimal,
    /// Entry time, epoch milliseconds.
    pub entry_time_ms: i64,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub status: PositionStatus,
    /// Index within the same-direction stack for this symbol; 0 for the
    /// first entry. Always unique and below the per-direction cap.
    pub stack_index: u32,
    /// How many partial-close thresholds have already fired.
    pub partials_taken: u32,
    /// The signal source that originated this position; empty for
    /// positions opened outside the engine.
    pub source_id: String,
    /// Profit banked by partial closes, in account currency.
    pub realized_profit: Decimal,
    pub unrealized_profit: Decimal,
    pub close_price: Option<Decimal>,
    pub close_time_ms: Option<i64>,
}

impl Position {
    /// Signed price move from entry, in pips, positive when favorable.
    pub fn profit_pips(&self, current_price: Decimal, pip_size: Decimal) -> Decimal {
        (current_price - self.entry_price) * self.direction.sign() / pip_size
    }
}

/// A fully sized order, ready for admission and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account: AccountId,
    pub symbol: Symbol,
    pub direction: Direction,
    /// Volume in lots, already floored to the step and clamped.
    pub volume: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Stack index this order will occupy if admitted.
    pub stack_index: u32,
    /// Identifier of the signal source, carried through for records.
    pub source_id: String,
}

/// A point-in-time snapshot of account finances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_free: Decimal,
}

/// Why a close fill happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// A partial-close threshold fired; the position stays open.
    PartialTake,
    /// Closed by an explicit command (operator or end of replay).
    Manual,
}

/// The persisted shape of one close fill, partial or final.
///
/// This is what the storage collaborator receives and what analytics
/// consumes; live and simulated execution produce the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticket: u64,
    pub account: AccountId,
    pub symbol: Symbol,
    pub direction: Direction,
    /// The volume closed by this fill, in lots.
    pub volume: Decimal,
    pub entry_price: Decimal,
    pub entry_time_ms: i64,
    pub exit_price: Decimal,
    pub exit_time_ms: i64,
    /// Stop-loss/take-profit at the moment of the fill.
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Profit of the closed volume net of commission.
    pub profit: Decimal,
    pub commission: Decimal,
    pub stack_index: u32,
    pub exit_reason: ExitReason,
    pub source_id: String,
}

/// One point of the equity series; appended per simulated bar or live poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquitySample {
    /// Sample time, epoch milliseconds.
    pub timestamp_ms: i64,
    pub balance: Decimal,
    /// Balance plus open unrealized P/L.
    pub equity: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
}
