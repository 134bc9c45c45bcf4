use crate::{Error, Result};
use core_types::{AccountId, Position, Signal, Symbol};
use execution::ExecutionBackend;
use risk::RiskSizer;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// The portfolio-wide gatekeeper between sized signals and the market.
///
/// Every admission re-queries the backend's open-position set — never an
/// internal cache — so positions opened outside the engine count against
/// every limit. Rejections are side-effect-free: the cooldown timer only
/// resets when an order is actually opened.
pub struct PositionGovernor {
    account: AccountId,
    sizer: RiskSizer,
    /// Last admitted-open time per symbol, epoch milliseconds.
    cooldowns: HashMap<Symbol, i64>,
}

impl PositionGovernor {
    pub fn new(account: AccountId, sizer: RiskSizer) -> Self {
        Self {
            account,
            sizer,
            cooldowns: HashMap::new(),
        }
    }

    pub fn sizer(&self) -> &RiskSizer {
        &self.sizer
    }

    /// Runs the full admission pipeline for one signal and, if every
    /// check passes, opens the position through the backend.
    ///
    /// `now_ms` is the caller's clock — wall time in live mode, the bar
    /// time in simulation — which keeps the cooldown logic replayable.
    pub async fn admit(
        &mut self,
        backend: &dyn ExecutionBackend,
        signal: &Signal,
        now_ms: i64,
    ) -> Result<Position> {
        let profile = self.sizer.profile().clone();

        // --- 1. Cooldown ---
        if let Some(&last) = self.cooldowns.get(&signal.symbol) {
            let elapsed_ms = now_ms - last;
            let cooldown_ms = profile.cooldown_seconds as i64 * 1000;
            if elapsed_ms < cooldown_ms {
                return Err(Error::Cooldown {
                    symbol: signal.symbol.clone(),
                    remaining_ms: cooldown_ms - elapsed_ms,
                });
            }
        }

        // --- 2. Authoritative open set ---
        let positions = backend.open_positions(self.account).await?;

        // --- 3. Per-direction stacking cap ---
        let same_direction: Vec<&Position> = positions
            .iter()
            .filter(|p| p.symbol == signal.symbol && p.direction == signal.direction)
            .collect();
        let stack_count = same_direction.len() as u32;
        if let Some(rogue) = same_direction
            .iter()
            .find(|p| p.stack_index >= profile.max_positions_per_direction)
        {
            // An index at or past the cap cannot come from this pipeline.
            return Err(core_types::Error::InvariantViolation(format!(
                "ticket {} carries stack index {} at/over cap {}",
                rogue.ticket, rogue.stack_index, profile.max_positions_per_direction
            ))
            .into());
        }
        if stack_count >= profile.max_positions_per_direction {
            return Err(Error::StackingLimit {
                symbol: signal.symbol.clone(),
                direction: signal.direction,
                open: stack_count,
                max: profile.max_positions_per_direction,
            });
        }
        let stack_index = stack_count;

        // --- 4. Symbol and account position caps ---
        let symbol_count = positions
            .iter()
            .filter(|p| p.symbol == signal.symbol)
            .count() as u32;
        if symbol_count >= profile.max_symbol_positions {
            return Err(Error::PortfolioLimit {
                scope: format!("symbol {}", signal.symbol),
                open: symbol_count,
                max: profile.max_symbol_positions,
            });
        }
        let account_count = positions.len() as u32;
        if account_count >= profile.max_account_positions {
            return Err(Error::PortfolioLimit {
                scope: format!("account {}", self.account),
                open: account_count,
                max: profile.max_account_positions,
            });
        }

        // --- 5. Size the order, scaling risk down the stack ---
        let account_state = backend.account_state(self.account).await?;
        let effective_risk =
            profile.risk_percent * stack_scale(profile.stacking_risk_multiplier, stack_index);
        let order = self.sizer.size(
            signal,
            self.account,
            account_state.balance,
            effective_risk,
            stack_index,
        )?;

        // --- 6. Projected total exposure against the equity cap ---
        let spec = self.sizer.spec();
        let open_exposure: Decimal = positions
            .iter()
            .map(|p| p.volume * spec.contract_size * p.entry_price)
            .sum();
        let projected =
            open_exposure + order.volume * spec.contract_size * signal.reference_price;
        let cap = profile.portfolio_risk_percent_cap / Decimal::ONE_HUNDRED * account_state.equity;
        if projected > cap {
            return Err(Error::ExposureLimit { projected, cap });
        }

        // --- 7. Margin sufficiency ---
        let required = order.volume * spec.margin_per_lot;
        if required > account_state.margin_free {
            return Err(Error::InsufficientMargin {
                required,
                available: account_state.margin_free,
            });
        }

        // --- 8. Open, then and only then reset the cooldown ---
        let position = backend.open_position(&order).await?;
        self.cooldowns.insert(signal.symbol.clone(), now_ms);
        tracing::info!(
            ticket = position.ticket,
            symbol = %position.symbol,
            direction = ?position.direction,
            volume = %position.volume,
            stack_index,
            "Order admitted and opened."
        );
        Ok(position)
    }
}

/// The compounding stack-risk multiplier: `multiplier^index`.
fn stack_scale(multiplier: Decimal, index: u32) -> Decimal {
    let mut scale = Decimal::ONE;
    for _ in 0..index {
        scale *= multiplier;
    }
    scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Bar, Direction, OrderRequest, SymbolSpec};
    use execution::simulated::SimulatedExecutor;
    use execution::SimulationSettings;
    use risk::RiskProfile;
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast;

    fn spec() -> SymbolSpec {
        SymbolSpec {
            pip_size: dec!(0.0001),
            pip_value_per_lot: dec!(10),
            contract_size: dec!(100000),
            volume_min: dec!(0.01),
            volume_max: dec!(100),
            volume_step: dec!(0.01),
            margin_per_lot: dec!(1000),
            digits: 5,
        }
    }

    fn profile() -> RiskProfile {
        RiskProfile {
            risk_percent: dec!(1),
            stop_loss_pips: dec!(20),
            take_profit_pips: dec!(40),
            min_position_size: dec!(0.01),
            max_position_size: dec!(50),
            max_positions_per_direction: 2,
            max_symbol_positions: 4,
            max_account_positions: 10,
            stacking_risk_multiplier: dec!(1),
            cooldown_seconds: 0,
            portfolio_risk_percent_cap: dec!(10000),
        }
    }

    fn backend() -> SimulatedExecutor {
        let (tx, _rx) = broadcast::channel(16);
        SimulatedExecutor::new(
            SimulationSettings {
                slippage_pips: dec!(0),
                commission_per_lot: dec!(0),
                initial_balance: dec!(10000),
                max_concurrent_positions: 50,
            },
            spec(),
            tx,
        )
    }

    async fn backend_at(price: Decimal) -> SimulatedExecutor {
        let exec = backend();
        exec.set_bar(Bar {
            open_time: 0,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: dec!(0),
        })
        .await;
        exec
    }

    fn signal(direction: Direction, timestamp_ms: i64) -> Signal {
        Signal {
            symbol: Symbol("EURUSD".to_string()),
            direction,
            reference_price: dec!(1.1000),
            confidence: 0.9,
            timestamp_ms,
            source_id: "test".to_string(),
        }
    }

    fn make_governor(profile: RiskProfile) -> PositionGovernor {
        PositionGovernor::new(AccountId(1), RiskSizer::new(spec(), profile))
    }

    #[tokio::test]
    async fn stacking_cap_admits_two_rejects_third_allows_opposite() {
        let backend = backend_at(dec!(1.1000)).await;
        let mut governor = make_governor(profile());

        governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap();
        governor.admit(&backend, &signal(Direction::Buy, 1000), 1000).await.unwrap();

        let err = governor
            .admit(&backend, &signal(Direction::Buy, 2000), 2000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StackingLimit { open: 2, max: 2, .. }));
        assert!(err.is_policy_rejection());

        // The rejection reached no order call.
        let open = backend.open_positions(AccountId(1)).await.unwrap();
        assert_eq!(open.len(), 2);

        // A sell on the same symbol is a different stack.
        governor.admit(&backend, &signal(Direction::Sell, 3000), 3000).await.unwrap();
        let open = backend.open_positions(AccountId(1)).await.unwrap();
        assert_eq!(open.len(), 3);
    }

    #[tokio::test]
    async fn stack_indices_are_assigned_in_order() {
        let backend = backend_at(dec!(1.1000)).await;
        let mut governor = make_governor(profile());

        let first = governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap();
        let second = governor.admit(&backend, &signal(Direction::Buy, 1), 1).await.unwrap();
        assert_eq!(first.stack_index, 0);
        assert_eq!(second.stack_index, 1);
    }

    #[tokio::test]
    async fn cooldown_rejects_within_window_admits_after() {
        let mut config = profile();
        config.cooldown_seconds = 30;
        let backend = backend_at(dec!(1.1000)).await;
        let mut governor = make_governor(config.clone());

        governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap();
        let err = governor
            .admit(&backend, &signal(Direction::Buy, 10_000), 10_000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cooldown { remaining_ms: 20_000, .. }));

        // 31 seconds apart clears the window.
        let backend = backend_at(dec!(1.1000)).await;
        let mut governor = make_governor(config);
        governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap();
        governor
            .admit(&backend, &signal(Direction::Buy, 31_000), 31_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stacked_entries_risk_less() {
        let mut config = profile();
        config.stacking_risk_multiplier = dec!(0.5);
        let backend = backend_at(dec!(1.1000)).await;
        let mut governor = make_governor(config);

        let first = governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap();
        let second = governor.admit(&backend, &signal(Direction::Buy, 1), 1).await.unwrap();
        // 1% of $10,000 over 20 pips is 0.50 lots; half risk halves it.
        assert_eq!(first.volume, dec!(0.50));
        assert_eq!(second.volume, dec!(0.25));
    }

    #[tokio::test]
    async fn exposure_cap_rejects_before_any_order() {
        let mut config = profile();
        // 0.50 lots of EURUSD is $55,000 notional; cap it at $50,000.
        config.portfolio_risk_percent_cap = dec!(500);
        let backend = backend_at(dec!(1.1000)).await;
        let mut governor = make_governor(config);

        let err = governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap_err();
        assert!(matches!(err, Error::ExposureLimit { .. }));
        assert!(backend.open_positions(AccountId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn symbol_position_cap_applies_across_directions() {
        let mut config = profile();
        config.max_symbol_positions = 2;
        let backend = backend_at(dec!(1.1000)).await;
        let mut governor = make_governor(config);

        governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap();
        governor.admit(&backend, &signal(Direction::Sell, 1), 1).await.unwrap();
        let err = governor.admit(&backend, &signal(Direction::Buy, 2), 2).await.unwrap_err();
        assert!(matches!(err, Error::PortfolioLimit { open: 2, max: 2, .. }));
    }

    #[tokio::test]
    async fn externally_opened_positions_count_against_limits() {
        let backend = backend_at(dec!(1.1000)).await;

        // Two positions opened outside the governor.
        for stack_index in 0..2 {
            backend
                .open_position(&OrderRequest {
                    account: AccountId(1),
                    symbol: Symbol("EURUSD".to_string()),
                    direction: Direction::Buy,
                    volume: dec!(0.10),
                    stop_loss: dec!(1.0980),
                    take_profit: dec!(0),
                    stack_index,
                    source_id: String::new(),
                })
                .await
                .unwrap();
        }

        let mut governor = make_governor(profile());
        let err = governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap_err();
        assert!(matches!(err, Error::StackingLimit { .. }));
    }

    #[tokio::test]
    async fn rogue_stack_index_is_an_invariant_violation() {
        let backend = backend_at(dec!(1.1000)).await;
        backend
            .open_position(&OrderRequest {
                account: AccountId(1),
                symbol: Symbol("EURUSD".to_string()),
                direction: Direction::Buy,
                volume: dec!(0.10),
                stop_loss: dec!(1.0980),
                take_profit: dec!(0),
                stack_index: 5,
                source_id: String::new(),
            })
            .await
            .unwrap();

        let mut governor = make_governor(profile());
        let err = governor.admit(&backend, &signal(Direction::Buy, 0), 0).await.unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
        assert!(!err.is_policy_rejection());
    }
}
