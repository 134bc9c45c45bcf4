use crate::types::SimulationSettings;
use crate::{Error, ExecutionBackend, Result};
use async_trait::async_trait;
use core_types::{
    AccountId, AccountState, Bar, Direction, EquitySample, ExitReason, OrderRequest, Position,
    PositionStatus, SymbolSpec, TradeRecord,
};
use events::{EngineEvent, PositionEvent};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, broadcast};

/// The backtest fill engine.
///
/// Strictly single-threaded per run: the backtester sets the current bar,
/// then every open/modify/close in that cycle fills against it. Nothing
/// here reads a wall clock or a random source, so two runs over the same
/// bars and settings produce bit-identical output.
pub struct SimulatedExecutor {
    settings: SimulationSettings,
    spec: SymbolSpec,
    state: Mutex<SimState>,
    events: broadcast::Sender<EngineEvent>,
}

#[derive(Debug)]
struct SimState {
    balance: Decimal,
    realized_total: Decimal,
    next_ticket: u64,
    bar: Option<Bar>,
    open: Vec<Position>,
    closed: Vec<TradeRecord>,
    equity_curve: Vec<EquitySample>,
}

impl SimulatedExecutor {
    pub fn new(
        settings: SimulationSettings,
        spec: SymbolSpec,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        let initial_balance = settings.initial_balance;
        Self {
            settings,
            spec,
            state: Mutex::new(SimState {
                balance: initial_balance,
                realized_total: Decimal::ZERO,
                next_ticket: 1,
                bar: None,
                open: Vec::new(),
                closed: Vec::new(),
                equity_curve: Vec::new(),
            }),
            events,
        }
    }

    /// Advances the market context to a new bar and marks every open
    /// position to the bar close.
    pub async fn set_bar(&self, bar: Bar) {
        let mut state = self.state.lock().await;
        for position in &mut state.open {
            position.unrealized_profit = pip_profit(&self.spec, position, bar.close);
        }
        state.bar = Some(bar);
    }

    /// Appends one equity sample from the current bar close plus all open
    /// unrealized P/L.
    pub async fn sample_equity(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let bar = state.bar.as_ref().ok_or(Error::StalePrice)?;
        let timestamp_ms = bar.open_time;
        let unrealized: Decimal = state.open.iter().map(|p| p.unrealized_profit).sum();
        let sample = EquitySample {
            timestamp_ms,
            balance: state.balance,
            equity: state.balance + unrealized,
            unrealized_pnl: unrealized,
            realized_pnl: state.realized_total,
        };
        state.equity_curve.push(sample);
        Ok(())
    }

    /// The closed-trade log and equity series accumulated so far, plus
    /// the final balance. Clones, so the run can keep going.
    pub async fn results(&self) -> (Vec<TradeRecord>, Vec<EquitySample>, Decimal) {
        let state = self.state.lock().await;
        (
            state.closed.clone(),
            state.equity_curve.clone(),
            state.balance,
        )
    }

    /// Adverse price offset for a fill in the given trade direction.
    fn slip(&self, direction: Direction, base: Decimal) -> Decimal {
        let offset = self.settings.slippage_pips * self.spec.pip_size;
        match direction {
            Direction::Buy => base + offset,
            Direction::Sell => base - offset,
        }
    }

    fn position_event(position: &Position, price: Decimal) -> PositionEvent {
        PositionEvent {
            account: position.account,
            symbol: position.symbol.clone(),
            ticket: position.ticket,
            status: position.status,
            price,
            profit: position.realized_profit,
        }
    }
}

/// Account-currency profit of the position's remaining volume at `price`.
fn pip_profit(spec: &SymbolSpec, position: &Position, price: Decimal) -> Decimal {
    position.profit_pips(price, spec.pip_size) * spec.pip_value_per_lot * position.volume
}

#[async_trait]
impl ExecutionBackend for SimulatedExecutor {
    fn name(&self) -> &'static str {
        "SimulatedExecutor"
    }

    async fn open_positions(&self, _account: AccountId) -> Result<Vec<Position>> {
        let state = self.state.lock().await;
        Ok(state.open.clone())
    }

    async fn account_state(&self, _account: AccountId) -> Result<AccountState> {
        let state = self.state.lock().await;
        let unrealized: Decimal = state.open.iter().map(|p| p.unrealized_profit).sum();
        let equity = state.balance + unrealized;
        let margin_used: Decimal = state
            .open
            .iter()
            .map(|p| p.volume * self.spec.margin_per_lot)
            .sum();
        Ok(AccountState {
            balance: state.balance,
            equity,
            margin_free: equity - margin_used,
        })
    }

    async fn open_position(&self, order: &OrderRequest) -> Result<Position> {
        if order.volume <= Decimal::ZERO {
            return Err(core_types::Error::InvariantViolation(format!(
                "order volume must be positive, got {}",
                order.volume
            ))
            .into());
        }

        let mut state = self.state.lock().await;
        let bar = state.bar.clone().ok_or(Error::StalePrice)?;

        if state.open.len() as u32 >= self.settings.max_concurrent_positions {
            return Err(Error::OrderRejected {
                reason: format!(
                    "max concurrent positions ({}) reached",
                    self.settings.max_concurrent_positions
                ),
            });
        }

        let unrealized: Decimal = state.open.iter().map(|p| p.unrealized_profit).sum();
        let margin_used: Decimal = state
            .open
            .iter()
            .map(|p| p.volume * self.spec.margin_per_lot)
            .sum();
        let margin_free = state.balance + unrealized - margin_used;
        let margin_needed = order.volume * self.spec.margin_per_lot;
        if margin_needed > margin_free {
            return Err(Error::OrderRejected {
                reason: format!(
                    "insufficient free margin: need {margin_needed}, have {margin_free}"
                ),
            });
        }

        let fill_price = self.slip(order.direction, bar.close);
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let position = Position {
            ticket,
            account: order.account,
            symbol: order.symbol.clone(),
            direction: order.direction,
            volume: order.volume,
            entry_price: fill_price,
            entry_time_ms: bar.open_time,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            status: PositionStatus::Open,
            stack_index: order.stack_index,
            partials_taken: 0,
            source_id: order.source_id.clone(),
            realized_profit: Decimal::ZERO,
            unrealized_profit: Decimal::ZERO,
            close_price: None,
            close_time_ms: None,
        };
        state.open.push(position.clone());

        tracing::debug!(ticket, price = %fill_price, volume = %order.volume, "Simulated fill: open.");
        let _ = self
            .events
            .send(EngineEvent::PositionOpened(Self::position_event(
                &position, fill_price,
            )));
        Ok(position)
    }

    async fn modify_position(
        &self,
        _account: AccountId,
        ticket: u64,
        stop_loss: Decimal,
        take_profit: Decimal,
        status: PositionStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let position = state
            .open
            .iter_mut()
            .find(|p| p.ticket == ticket)
            .ok_or(Error::UnknownTicket { ticket })?;

        if position.status != status && !position.status.can_transition_to(status) {
            return Err(core_types::Error::IllegalTransition {
                ticket,
                from: position.status,
                to: status,
            }
            .into());
        }

        position.stop_loss = stop_loss;
        position.take_profit = take_profit;
        position.status = status;

        let event = Self::position_event(position, stop_loss);
        let _ = self.events.send(EngineEvent::PositionModified(event));
        Ok(())
    }

    async fn close_position(
        &self,
        _account: AccountId,
        ticket: u64,
        volume: Decimal,
        price: Option<Decimal>,
        reason: ExitReason,
    ) -> Result<TradeRecord> {
        let mut state = self.state.lock().await;
        let bar = state.bar.clone().ok_or(Error::StalePrice)?;
        let index = state
            .open
            .iter()
            .position(|p| p.ticket == ticket)
            .ok_or(Error::UnknownTicket { ticket })?;

        let position = &state.open[index];
        if volume <= Decimal::ZERO || volume > position.volume {
            return Err(core_types::Error::InvariantViolation(format!(
                "close volume {volume} out of range (0, {}]",
                position.volume
            ))
            .into());
        }

        let full_close = volume == position.volume;
        let next_status = if full_close {
            PositionStatus::Closed
        } else {
            PositionStatus::PartiallyClosed
        };
        if !position.status.can_transition_to(next_status) {
            return Err(core_types::Error::IllegalTransition {
                ticket,
                from: position.status,
                to: next_status,
            }
            .into());
        }

        // Protective closes fill at the trigger level the caller passes;
        // market closes fill at bar close with adverse slippage on the
        // closing side.
        let exit_price = match price {
            Some(level) => level,
            None => self.slip(position.direction.opposite(), bar.close),
        };

        let gross = position.profit_pips(exit_price, self.spec.pip_size)
            * self.spec.pip_value_per_lot
            * volume;
        let commission = self.settings.commission_per_lot * volume;
        let net = gross - commission;

        let position = &mut state.open[index];
        position.realized_profit += net;
        let record = TradeRecord {
            ticket,
            account: position.account,
            symbol: position.symbol.clone(),
            direction: position.direction,
            volume,
            entry_price: position.entry_price,
            entry_time_ms: position.entry_time_ms,
            exit_price,
            exit_time_ms: bar.open_time,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            profit: net,
            commission,
            stack_index: position.stack_index,
            exit_reason: reason,
            source_id: position.source_id.clone(),
        };

        if full_close {
            position.status = PositionStatus::Closed;
            position.volume = Decimal::ZERO;
            position.unrealized_profit = Decimal::ZERO;
            position.close_price = Some(exit_price);
            position.close_time_ms = Some(bar.open_time);
            let event = Self::position_event(position, exit_price);
            state.open.remove(index);
            let _ = self.events.send(EngineEvent::PositionClosed(event));
        } else {
            position.volume -= volume;
            position.partials_taken += 1;
            position.status = PositionStatus::PartiallyClosed;
            position.unrealized_profit = pip_profit(&self.spec, position, bar.close);
            let event = Self::position_event(position, exit_price);
            let _ = self.events.send(EngineEvent::PositionModified(event));
        }

        state.balance += net;
        state.realized_total += net;
        state.closed.push(record.clone());

        tracing::debug!(ticket, price = %exit_price, volume = %volume, ?reason, "Simulated fill: close.");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Symbol;
    use rust_decimal_macros::dec;

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

    fn settings() -> SimulationSettings {
        SimulationSettings {
            slippage_pips: dec!(0.5),
            commission_per_lot: dec!(7),
            initial_balance: dec!(10000),
            max_concurrent_positions: 2,
        }
    }

    fn bar(open_time: i64, close: Decimal) -> Bar {
        Bar {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
        }
    }

    fn order(volume: Decimal) -> OrderRequest {
        OrderRequest {
            account: AccountId(1),
            symbol: Symbol("EURUSD".to_string()),
            direction: Direction::Buy,
            volume,
            stop_loss: dec!(1.0980),
            take_profit: dec!(1.1040),
            stack_index: 0,
            source_id: "test".to_string(),
        }
    }

    fn executor() -> SimulatedExecutor {
        let (tx, _rx) = broadcast::channel(16);
        SimulatedExecutor::new(settings(), spec(), tx)
    }

    #[tokio::test]
    async fn open_fills_with_adverse_slippage() {
        let exec = executor();
        exec.set_bar(bar(0, dec!(1.1000))).await;

        let position = exec.open_position(&order(dec!(0.50))).await.unwrap();
        // Buying: slippage pushes the fill up by half a pip.
        assert_eq!(position.entry_price, dec!(1.10005));
        assert_eq!(position.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn close_at_trigger_level_charges_commission() {
        let exec = executor();
        exec.set_bar(bar(0, dec!(1.1000))).await;
        let position = exec.open_position(&order(dec!(1))).await.unwrap();

        exec.set_bar(bar(60_000, dec!(1.0975))).await;
        let record = exec
            .close_position(
                AccountId(1),
                position.ticket,
                dec!(1),
                Some(dec!(1.0980)),
                ExitReason::StopLoss,
            )
            .await
            .unwrap();

        // Filled exactly at the stop level, not the bar close.
        assert_eq!(record.exit_price, dec!(1.0980));
        // Entry 1.10005 -> exit 1.0980 is -20.5 pips on 1 lot = -$205,
        // minus $7 commission.
        assert_eq!(record.profit, dec!(-212.0));
        let (_, _, balance) = exec.results().await;
        assert_eq!(balance, dec!(10000) + record.profit);
    }

    #[tokio::test]
    async fn partial_close_keeps_ticket_and_reduces_volume() {
        let exec = executor();
        exec.set_bar(bar(0, dec!(1.1000))).await;
        let position = exec.open_position(&order(dec!(1))).await.unwrap();

        exec.set_bar(bar(60_000, dec!(1.1030))).await;
        let record = exec
            .close_position(
                AccountId(1),
                position.ticket,
                dec!(0.40),
                None,
                ExitReason::PartialTake,
            )
            .await
            .unwrap();
        assert_eq!(record.ticket, position.ticket);

        let open = exec.open_positions(AccountId(1)).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ticket, position.ticket);
        assert_eq!(open[0].volume, dec!(0.60));
        assert_eq!(open[0].status, PositionStatus::PartiallyClosed);
        assert_eq!(open[0].partials_taken, 1);
    }

    #[tokio::test]
    async fn rejects_when_concurrency_cap_is_reached() {
        let exec = executor();
        exec.set_bar(bar(0, dec!(1.1000))).await;
        exec.open_position(&order(dec!(0.10))).await.unwrap();
        exec.open_position(&order(dec!(0.10))).await.unwrap();

        let err = exec.open_position(&order(dec!(0.10))).await.unwrap_err();
        assert!(matches!(err, Error::OrderRejected { .. }));
    }

    #[tokio::test]
    async fn rejects_on_insufficient_margin() {
        let exec = executor();
        exec.set_bar(bar(0, dec!(1.1000))).await;
        // 20 lots needs $20,000 margin against $10,000 equity.
        let err = exec.open_position(&order(dec!(20))).await.unwrap_err();
        assert!(matches!(err, Error::OrderRejected { .. }));
    }

    #[tokio::test]
    async fn negative_close_volume_is_an_invariant_violation() {
        let exec = executor();
        exec.set_bar(bar(0, dec!(1.1000))).await;
        let position = exec.open_position(&order(dec!(1))).await.unwrap();

        let err = exec
            .close_position(
                AccountId(1),
                position.ticket,
                dec!(-0.5),
                None,
                ExitReason::Manual,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[tokio::test]
    async fn equity_samples_track_unrealized_pnl() {
        let exec = executor();
        exec.set_bar(bar(0, dec!(1.1000))).await;
        exec.open_position(&order(dec!(1))).await.unwrap();

        // +19.5 pips from the slipped entry of 1.10005.
        exec.set_bar(bar(60_000, dec!(1.1020))).await;
        exec.sample_equity().await.unwrap();

        let (_, samples, _) = exec.results().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].unrealized_pnl, dec!(195.0));
        assert_eq!(samples[0].equity, dec!(10195.0));
    }
}
