use crate::types::{LifecycleSettings, PlannedAction, PriceView};
use crate::{Error, Result};
use core_types::{
    AccountId, Direction, ExitReason, Position, PositionStatus, SymbolSpec, TradeRecord,
};
use execution::ExecutionBackend;
use rust_decimal::Decimal;

/// Owns the protective-transition logic for every non-terminal position.
///
/// `plan` is a pure decision function; `sweep` applies plans through the
/// execution backend. The split keeps the trigger logic testable without
/// a backend and shared verbatim between live and simulated runs.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    spec: SymbolSpec,
    settings: LifecycleSettings,
}

impl LifecycleManager {
    pub fn new(spec: SymbolSpec, settings: LifecycleSettings) -> Self {
        Self { spec, settings }
    }

    /// Decides the single next action for a position, or `None`.
    ///
    /// Priority: terminal close, then partial close, then breakeven, then
    /// trailing update. Stop-loss beats take-profit when one bar crosses
    /// both — the pessimistic fill.
    pub fn plan(&self, position: &Position, view: &PriceView) -> Option<PlannedAction> {
        if position.status.is_terminal() || position.status == PositionStatus::Pending {
            return None;
        }

        // --- 1. Terminal close on a crossed protective level ---
        let sl = position.stop_loss;
        let tp = position.take_profit;
        let (sl_hit, tp_hit) = match position.direction {
            Direction::Buy => (
                sl > Decimal::ZERO && view.low <= sl,
                tp > Decimal::ZERO && view.high >= tp,
            ),
            Direction::Sell => (
                sl > Decimal::ZERO && view.high >= sl,
                tp > Decimal::ZERO && view.low <= tp,
            ),
        };
        if sl_hit {
            return Some(PlannedAction::Close {
                price: Some(sl),
                reason: ExitReason::StopLoss,
            });
        }
        if tp_hit {
            return Some(PlannedAction::Close {
                price: Some(tp),
                reason: ExitReason::TakeProfit,
            });
        }

        let profit_pips = position.profit_pips(view.current, self.spec.pip_size);

        // --- 2. Partial close at the next untriggered threshold ---
        if let Some(level) = self
            .settings
            .partial_closes
            .get(position.partials_taken as usize)
        {
            if level.trigger_pips > Decimal::ZERO && profit_pips >= level.trigger_pips {
                let step = self.spec.volume_step;
                let raw = position.volume * level.close_percent / Decimal::ONE_HUNDRED;
                let volume = (raw / step).floor() * step;
                if volume >= position.volume {
                    // The remainder would not survive the broker minimum.
                    return Some(PlannedAction::Close {
                        price: None,
                        reason: ExitReason::PartialTake,
                    });
                }
                if volume > Decimal::ZERO {
                    return Some(PlannedAction::PartialClose { volume });
                }
                // Rounds to zero at this volume: leave the level armed and
                // fall through to the stop logic.
            }
        }

        // --- 3. Breakeven, one-shot from Open ---
        if position.status == PositionStatus::Open
            && self.settings.breakeven_trigger_pips > Decimal::ZERO
            && profit_pips >= self.settings.breakeven_trigger_pips
        {
            let new_stop = position.entry_price
                + position.direction.sign()
                    * self.settings.breakeven_offset_pips
                    * self.spec.pip_size;
            if improves_stop(position, new_stop) {
                return Some(PlannedAction::MoveStop {
                    stop_loss: new_stop,
                    status: PositionStatus::BreakevenArmed,
                });
            }
        }

        // --- 4. Trailing stop, favorable direction only ---
        if self.settings.trailing_start_pips > Decimal::ZERO
            && profit_pips >= self.settings.trailing_start_pips
        {
            let candidate = view.current
                - position.direction.sign()
                    * self.settings.trailing_distance_pips
                    * self.spec.pip_size;
            if improves_stop(position, candidate) {
                let status = if position.status.can_transition_to(PositionStatus::Trailing) {
                    PositionStatus::Trailing
                } else {
                    position.status
                };
                return Some(PlannedAction::MoveStop {
                    stop_loss: candidate,
                    status,
                });
            }
        }

        None
    }

    /// Evaluates and applies one cycle of transitions for every open
    /// position on the account.
    ///
    /// Command failures are logged and left for the next cycle — the
    /// position is re-read from the authoritative backend then, and the
    /// same plan re-derives idempotently. Invariant violations abort the
    /// sweep instead.
    pub async fn sweep(
        &self,
        backend: &dyn ExecutionBackend,
        account: AccountId,
        view: &PriceView,
    ) -> Result<Vec<TradeRecord>> {
        let positions = backend.open_positions(account).await?;
        let mut closed = Vec::new();

        for position in positions.iter().filter(|p| !p.status.is_terminal()) {
            let Some(action) = self.plan(position, view) else {
                continue;
            };

            let outcome = match &action {
                PlannedAction::Close { price, reason } => backend
                    .close_position(account, position.ticket, position.volume, *price, *reason)
                    .await
                    .map(|record| closed.push(record)),
                PlannedAction::PartialClose { volume } => backend
                    .close_position(
                        account,
                        position.ticket,
                        *volume,
                        None,
                        ExitReason::PartialTake,
                    )
                    .await
                    .map(|record| closed.push(record)),
                PlannedAction::MoveStop { stop_loss, status } => {
                    backend
                        .modify_position(
                            account,
                            position.ticket,
                            *stop_loss,
                            position.take_profit,
                            *status,
                        )
                        .await
                }
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(ticket = position.ticket, ?action, "Lifecycle transition applied.");
                }
                Err(execution::Error::Invariant(e)) => return Err(Error::Invariant(e)),
                Err(e) => {
                    tracing::warn!(
                        ticket = position.ticket,
                        ?action,
                        error = %e,
                        "Lifecycle command failed; will retry next cycle."
                    );
                }
            }
        }

        Ok(closed)
    }
}

/// Whether `candidate` tightens the stop in the position's favor.
/// A zero stop means none is set, so any candidate improves it.
fn improves_stop(position: &Position, candidate: Decimal) -> bool {
    if position.stop_loss == Decimal::ZERO {
        return true;
    }
    match position.direction {
        Direction::Buy => candidate > position.stop_loss,
        Direction::Sell => candidate < position.stop_loss,
    }
}
