use crate::feed::{MarketFeed, SignalSource};
use core_types::{AccountId, EquitySample, Symbol};
use events::{EngineEvent, EquityEvent};
use execution::ExecutionBackend;
use governor::PositionGovernor;
use lifecycle::{LifecycleManager, PriceView};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// A self-contained trading loop for a single account/symbol pair.
///
/// Each cycle polls for a pending signal, runs it through the governor,
/// then sweeps protective transitions over the authoritative open set.
/// Transient failures (bridge hiccups, rejected orders) are logged and
/// retried next cycle; invariant violations terminate the task.
pub struct TradingTask {
    account: AccountId,
    symbol: Symbol,
    poll_interval: Duration,
    governor: PositionGovernor,
    lifecycle: LifecycleManager,
    backend: Arc<dyn ExecutionBackend>,
    feed: Arc<dyn MarketFeed>,
    signals: Arc<dyn SignalSource>,
    events: broadcast::Sender<EngineEvent>,
}

impl TradingTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: AccountId,
        symbol: Symbol,
        poll_interval: Duration,
        governor: PositionGovernor,
        lifecycle: LifecycleManager,
        backend: Arc<dyn ExecutionBackend>,
        feed: Arc<dyn MarketFeed>,
        signals: Arc<dyn SignalSource>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            account,
            symbol,
            poll_interval,
            governor,
            lifecycle,
            backend,
            feed,
            signals,
            events,
        }
    }

    /// The long-running loop. Returns when `stop` flips to true, or with
    /// an error on the first invariant violation.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(account = %self.account, symbol = %self.symbol, "Starting trading task.");

        while !*stop.borrow() {
            self.cycle().await?;

            tokio::select! {
                _ = stop.changed() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(account = %self.account, symbol = %self.symbol, "Trading task stopped.");
        Ok(())
    }

    /// One trading cycle. Only invariant violations surface as errors;
    /// everything else is logged and left for the next cycle.
    pub async fn cycle(&mut self) -> anyhow::Result<()> {
        let bar = match self.feed.latest_bar(&self.symbol).await {
            Ok(bar) => bar,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "No market data this cycle.");
                return Ok(());
            }
        };
        let view = PriceView::tick(bar.close);
        let now_ms = chrono::Utc::now().timestamp_millis();

        match self.signals.poll(self.account, &self.symbol).await {
            Ok(Some(signal)) => {
                match self
                    .governor
                    .admit(self.backend.as_ref(), &signal, now_ms)
                    .await
                {
                    Ok(position) => {
                        info!(
                            ticket = position.ticket,
                            symbol = %position.symbol,
                            volume = %position.volume,
                            "Signal admitted."
                        );
                    }
                    Err(e) if e.is_policy_rejection() => {
                        info!(symbol = %signal.symbol, reason = %e, "Signal rejected by policy.");
                    }
                    Err(governor::Error::Invariant(e)) => return Err(e.into()),
                    Err(e) => {
                        warn!(symbol = %signal.symbol, error = %e, "Signal execution failed.");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Signal poll failed.");
            }
        }

        match self
            .lifecycle
            .sweep(self.backend.as_ref(), self.account, &view)
            .await
        {
            Ok(records) => {
                for record in records {
                    info!(
                        ticket = record.ticket,
                        profit = %record.profit,
                        reason = ?record.exit_reason,
                        "Position closed."
                    );
                }
            }
            Err(lifecycle::Error::Invariant(e)) => return Err(e.into()),
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Lifecycle sweep failed.");
            }
        }

        // One equity sample per poll, mirroring the simulated per-bar series.
        match self.backend.account_state(self.account).await {
            Ok(state) => {
                let sample = EquitySample {
                    timestamp_ms: now_ms,
                    balance: state.balance,
                    equity: state.equity,
                    unrealized_pnl: state.equity - state.balance,
                    // The terminal folds realized profit into the balance.
                    realized_pnl: Decimal::ZERO,
                };
                let _ = self.events.send(EngineEvent::EquitySampled(EquityEvent {
                    account: self.account,
                    sample,
                }));
            }
            Err(e) => {
                warn!(account = %self.account, error = %e, "Equity sample failed.");
            }
        }

        Ok(())
    }
}
