use core_types::SymbolSpec;
use execution::SimulationSettings;
use lifecycle::LifecycleSettings;
use risk::RiskProfile;
use serde::Deserialize;
use std::collections::HashMap;

/// The fully layered application settings.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub app: AppSettings,
    /// The terminal bridge the live backend talks to.
    pub bridge: BridgeSettings,
    /// The account-wide default risk profile. Pairs may override it.
    pub risk: RiskProfile,
    /// The account-wide default lifecycle settings. Pairs may override.
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
    /// Fill-model parameters, required for backtests and sweeps only.
    pub simulation: Option<SimulationSettings>,
    /// Broker contract specifications, keyed by symbol name.
    pub symbols: HashMap<String, SymbolSpec>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// "development", "production", etc.
    pub environment: String,
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BridgeSettings {
    /// Base URL of the bridge, e.g. "http://127.0.0.1:8787".
    pub base_url: String,
    /// Bearer token identifying this engine instance.
    pub auth_token: String,
    /// Bar timeframe requested from the bridge (e.g. "M1").
    pub timeframe: String,
    /// Milliseconds between trading-cycle polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

// --- Structs for accounts.toml ---

/// The manifest of accounts and symbols a live run trades.
#[derive(Deserialize, Debug, Clone)]
pub struct AccountsConfig {
    pub accounts: Vec<AccountConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AccountConfig {
    /// The terminal-assigned account number.
    pub id: u64,
    pub pairs: Vec<PairConfig>,
}

/// One account/symbol trading assignment.
#[derive(Deserialize, Debug, Clone)]
pub struct PairConfig {
    pub symbol: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the account-wide risk profile for this pair.
    pub risk: Option<RiskProfile>,
    /// Overrides the account-wide lifecycle settings for this pair.
    pub lifecycle: Option<LifecycleSettings>,
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1_000
}
