use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The client for the terminal bridge's REST API.
///
/// The bridge is a thin HTTP adapter in front of the broker terminal;
/// it owns sessions and credentials, we only carry a bearer token.
#[derive(Debug, Clone)]
pub struct TerminalBridge {
    /// The persistent HTTP client.
    pub http_client: Client,
    /// The bearer token identifying this engine instance to the bridge.
    pub auth_token: String,
    /// The base URL of the bridge (e.g. "http://127.0.0.1:8787").
    pub base_url: String,
}

/// One open position as reported by the terminal.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct BridgePosition {
    pub ticket: u64,
    pub symbol: String,
    /// "buy" or "sell".
    pub direction: String,
    pub volume: Decimal,
    pub entry_price: Decimal,
    /// Entry time, epoch milliseconds.
    pub entry_time_ms: i64,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// The floating profit as the terminal computes it.
    pub unrealized_profit: Decimal,
    /// Stack index the engine recorded at open time; absent for
    /// positions opened outside the engine.
    pub stack_index: Option<u32>,
}

/// The terminal's view of account finances.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeAccount {
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_free: Decimal,
}

/// Acknowledgement of a filled market order.
#[derive(Debug, Deserialize, Clone)]
pub struct OrderAck {
    pub ticket: u64,
    /// The actual average fill price.
    pub fill_price: Decimal,
    /// Fill time, epoch milliseconds.
    pub fill_time_ms: i64,
}

/// Acknowledgement of a full or partial close.
#[derive(Debug, Deserialize, Clone)]
pub struct CloseAck {
    pub ticket: u64,
    pub close_price: Decimal,
    pub close_time_ms: i64,
    /// Realized profit of the closed volume, in account currency.
    pub profit: Decimal,
}

/// One OHLCV bar as the bridge serves it.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeBar {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A pending trade intent queued by the strategy layer.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeSignal {
    pub symbol: String,
    /// "buy" or "sell".
    pub direction: String,
    pub reference_price: Decimal,
    pub confidence: f64,
    pub timestamp_ms: i64,
    pub source_id: String,
}
