use config::{Config, Environment, File};
use core_types::{Symbol, SymbolSpec};

pub mod error;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use types::{
    AccountConfig, AccountsConfig, AppSettings, BridgeSettings, PairConfig, Settings,
};

/// Loads the layered application settings.
///
/// 1. `config/base.toml`.
/// 2. `config/{APP_ENVIRONMENT}.toml`, if present.
/// 3. `APP`-prefixed environment variables with `__` separators
///    (e.g. `APP_BRIDGE__AUTH_TOKEN=...`).
pub fn load_settings() -> Result<Settings> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name("config/base"))
        .add_source(File::with_name(&format!("config/{}", environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Loads the account/symbol manifest from `config/accounts.toml`.
pub fn load_accounts() -> Result<AccountsConfig> {
    let content = std::fs::read_to_string("config/accounts.toml")?;
    Ok(toml::from_str(&content)?)
}

impl Settings {
    /// The contract spec for a symbol, or a typed error naming it.
    pub fn symbol_spec(&self, symbol: &Symbol) -> Result<SymbolSpec> {
        self.symbols
            .get(&symbol.0)
            .cloned()
            .ok_or_else(|| Error::UnknownSymbol(symbol.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BASE: &str = r#"
        [app]
        environment = "development"
        log_level = "info"

        [bridge]
        base_url = "http://127.0.0.1:8787"
        auth_token = "secret"
        timeframe = "M1"

        [risk]
        risk_percent = 1.0
        stop_loss_pips = 20.0
        take_profit_pips = 40.0
        max_positions_per_direction = 2
        cooldown_seconds = 300

        [lifecycle]
        breakeven_trigger_pips = 15.0
        breakeven_offset_pips = 2.0

        [[lifecycle.partial_closes]]
        trigger_pips = 25.0
        close_percent = 50.0

        [simulation]
        slippage_pips = 0.5
        commission_per_lot = 7.0
        initial_balance = 10000.0
        max_concurrent_positions = 10

        [symbols.EURUSD]
        pip_size = 0.0001
        pip_value_per_lot = 10.0
        contract_size = 100000.0
        volume_min = 0.01
        volume_max = 100.0
        volume_step = 0.01
        margin_per_lot = 1000.0
        digits = 5
    "#;

    #[test]
    fn full_settings_file_parses() {
        let settings: Settings = toml::from_str(BASE).unwrap();
        assert_eq!(settings.bridge.poll_interval_ms, 1_000);
        assert_eq!(settings.risk.risk_percent, dec!(1.0));
        // Unspecified profile fields take their documented defaults.
        assert_eq!(settings.risk.max_symbol_positions, 4);
        assert_eq!(settings.lifecycle.partial_closes.len(), 1);
        assert_eq!(settings.lifecycle.trailing_start_pips, dec!(0));

        let spec = settings
            .symbol_spec(&Symbol("EURUSD".to_string()))
            .unwrap();
        assert_eq!(spec.pip_size, dec!(0.0001));
    }

    #[test]
    fn missing_lifecycle_section_defaults_to_disabled() {
        let trimmed = BASE.replace("[lifecycle]", "[lifecycle_unused]");
        let settings: Settings = toml::from_str(&trimmed).unwrap();
        assert_eq!(settings.lifecycle.breakeven_trigger_pips, dec!(0));
    }

    #[test]
    fn unknown_symbol_is_a_typed_error() {
        let settings: Settings = toml::from_str(BASE).unwrap();
        let err = settings
            .symbol_spec(&Symbol("XAUUSD".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol(_)));
    }

    #[test]
    fn accounts_manifest_parses_with_defaults() {
        let manifest = r#"
            [[accounts]]
            id = 101

            [[accounts.pairs]]
            symbol = "EURUSD"

            [[accounts.pairs]]
            symbol = "GBPUSD"
            enabled = false

            [accounts.pairs.risk]
            risk_percent = 0.5
            stop_loss_pips = 30.0
        "#;
        let config: AccountsConfig = toml::from_str(manifest).unwrap();
        assert_eq!(config.accounts.len(), 1);
        let account = &config.accounts[0];
        assert_eq!(account.id, 101);
        assert!(account.pairs[0].enabled);
        assert!(account.pairs[0].risk.is_none());
        assert!(!account.pairs[1].enabled);
        assert_eq!(
            account.pairs[1].risk.as_ref().unwrap().risk_percent,
            dec!(0.5)
        );
    }
}
