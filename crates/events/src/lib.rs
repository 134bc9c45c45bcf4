// --- Engine event structures consumed by the presentation layer ---

use chrono::{DateTime, Utc};
use core_types::{AccountId, EquitySample, PositionStatus, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

/// A log message event forwarded to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// The position snapshot carried by every position event.
#[derive(Debug, Clone, Serialize)]
pub struct PositionEvent {
    pub account: AccountId,
    pub symbol: Symbol,
    pub ticket: u64,
    pub status: PositionStatus,
    /// The price at which the event occurred (fill, new stop, exit).
    pub price: Decimal,
    /// Realized profit so far for this position.
    pub profit: Decimal,
}

/// A per-cycle account equity snapshot, the live counterpart of the
/// simulated per-bar equity series.
#[derive(Debug, Clone, Serialize)]
pub struct EquityEvent {
    pub account: AccountId,
    pub sample: EquitySample,
}

/// The top-level engine event enum.
/// `tag` and `content` give subscribers a clean JSON representation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    Log(LogMessage),
    PositionOpened(PositionEvent),
    PositionModified(PositionEvent),
    PositionClosed(PositionEvent),
    EquitySampled(EquityEvent),
}
