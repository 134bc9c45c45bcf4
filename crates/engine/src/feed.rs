use async_trait::async_trait;
use connector::{TerminalBridge, parse_direction};
use core_types::{AccountId, Bar, Signal, Symbol};

/// Supplies the latest market bar for a symbol.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn latest_bar(&self, symbol: &Symbol) -> anyhow::Result<Bar>;
}

/// Supplies pending trade intents from the external strategy layer.
///
/// A signal is consumed by the poll that returns it; the governor gets
/// exactly one admission attempt per signal.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn poll(&self, account: AccountId, symbol: &Symbol) -> anyhow::Result<Option<Signal>>;
}

/// Bars and signals served by the terminal bridge.
#[derive(Debug, Clone)]
pub struct BridgeFeed {
    bridge: TerminalBridge,
    timeframe: String,
}

impl BridgeFeed {
    pub fn new(bridge: TerminalBridge, timeframe: String) -> Self {
        Self { bridge, timeframe }
    }
}

#[async_trait]
impl MarketFeed for BridgeFeed {
    async fn latest_bar(&self, symbol: &Symbol) -> anyhow::Result<Bar> {
        let raw = self.bridge.latest_bar(symbol, &self.timeframe).await?;
        Ok(Bar {
            open_time: raw.open_time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        })
    }
}

#[async_trait]
impl SignalSource for BridgeFeed {
    async fn poll(&self, account: AccountId, symbol: &Symbol) -> anyhow::Result<Option<Signal>> {
        let Some(raw) = self.bridge.poll_signal(account, symbol).await? else {
            return Ok(None);
        };
        Ok(Some(Signal {
            symbol: Symbol(raw.symbol),
            direction: parse_direction(&raw.direction)?,
            reference_price: raw.reference_price,
            confidence: raw.confidence,
            timestamp_ms: raw.timestamp_ms,
            source_id: raw.source_id,
        }))
    }
}
