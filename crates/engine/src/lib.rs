pub mod feed;
pub mod task;

pub use feed::{BridgeFeed, MarketFeed, SignalSource};
pub use task::TradingTask;

use app_config::{AccountsConfig, Settings};
use connector::TerminalBridge;
use core_types::{AccountId, Symbol};
use events::EngineEvent;
use execution::live::LiveExecutor;
use futures::future;
use governor::PositionGovernor;
use lifecycle::LifecycleManager;
use risk::RiskSizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// The portfolio-level orchestrator for live trading.
///
/// Spawns one `TradingTask` per enabled account/symbol pair, all sharing
/// one `LiveExecutor` per account so lifecycle bookkeeping stays
/// consistent across symbols.
pub struct Engine {
    settings: Settings,
    accounts: AccountsConfig,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(
        settings: Settings,
        accounts: AccountsConfig,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            settings,
            accounts,
            events,
        }
    }

    /// Runs every configured trading task until `stop` flips to true or
    /// a task dies on an invariant violation.
    pub async fn run(&self, stop: watch::Receiver<bool>) -> anyhow::Result<()> {
        tracing::info!("Initializing trading engine.");

        let bridge = TerminalBridge::new(
            self.settings.bridge.base_url.clone(),
            self.settings.bridge.auth_token.clone(),
        );
        let feed = Arc::new(BridgeFeed::new(
            bridge.clone(),
            self.settings.bridge.timeframe.clone(),
        ));
        let poll_interval = Duration::from_millis(self.settings.bridge.poll_interval_ms);

        let mut handles = vec![];
        for account_config in &self.accounts.accounts {
            let account = AccountId(account_config.id);
            let backend: Arc<LiveExecutor> =
                Arc::new(LiveExecutor::new(bridge.clone(), self.events.clone()));

            for pair in &account_config.pairs {
                if !pair.enabled {
                    tracing::warn!(account = %account, symbol = %pair.symbol, "Skipping disabled pair.");
                    continue;
                }

                let symbol = Symbol(pair.symbol.clone());
                let spec = self.settings.symbol_spec(&symbol)?;
                let profile = pair
                    .risk
                    .clone()
                    .unwrap_or_else(|| self.settings.risk.clone());
                let lifecycle_settings = pair
                    .lifecycle
                    .clone()
                    .unwrap_or_else(|| self.settings.lifecycle.clone());

                tracing::info!(account = %account, symbol = %symbol, "Setting up trading task.");
                let mut task = TradingTask::new(
                    account,
                    symbol,
                    poll_interval,
                    PositionGovernor::new(account, RiskSizer::new(spec.clone(), profile)),
                    LifecycleManager::new(spec, lifecycle_settings),
                    backend.clone(),
                    feed.clone(),
                    feed.clone(),
                    self.events.clone(),
                );

                let task_stop = stop.clone();
                handles.push(tokio::spawn(async move { task.run(task_stop).await }));
            }
        }

        if handles.is_empty() {
            anyhow::bail!("No trading tasks were started. Check config/accounts.toml.");
        }
        tracing::info!(count = handles.len(), "All trading tasks spawned.");

        let results = future::join_all(handles).await;
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Trading task terminated with error."),
                Err(e) => tracing::error!(error = %e, "Trading task panicked."),
            }
        }
        Ok(())
    }
}
