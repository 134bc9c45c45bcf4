use crate::{Error, ExecutionBackend, Result};
use async_trait::async_trait;
use connector::{BridgePosition, TerminalBridge, parse_direction};
use core_types::{
    AccountId, AccountState, ExitReason, OrderRequest, Position, PositionStatus, Symbol,
    TradeRecord,
};
use events::{EngineEvent, PositionEvent};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};

/// Attempts for idempotent reads before giving up on the bridge.
const READ_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Lifecycle bookkeeping the terminal cannot hold for us.
///
/// The terminal knows tickets, prices and volumes; it has no notion of
/// breakeven/trailing states or how many partial thresholds have fired.
/// This sidecar is merged into every position snapshot. Positions opened
/// outside the engine have no entry here and surface with defaults.
#[derive(Debug, Clone)]
struct Bookkeeping {
    status: PositionStatus,
    partials_taken: u32,
    source_id: String,
    realized_profit: Decimal,
}

impl Bookkeeping {
    fn opened(source_id: String) -> Self {
        Self {
            status: PositionStatus::Open,
            partials_taken: 0,
            source_id,
            realized_profit: Decimal::ZERO,
        }
    }
}

/// The execution backend that trades through the terminal bridge.
///
/// All fills, prices and timestamps come from the terminal's
/// acknowledgements; nothing is estimated locally. Reads are retried a
/// bounded number of times on transport errors; order submission is
/// retried at most once, and only after the open-position query confirms
/// the first attempt did not fill.
pub struct LiveExecutor {
    bridge: TerminalBridge,
    book: Mutex<HashMap<u64, Bookkeeping>>,
    events: broadcast::Sender<EngineEvent>,
}

impl LiveExecutor {
    pub fn new(bridge: TerminalBridge, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            bridge,
            book: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Runs an idempotent bridge read, retrying transport failures.
    async fn retry_read<T, F, Fut>(&self, what: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = connector::Result<T>>,
    {
        for attempt in 1..READ_ATTEMPTS {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transport(&e) => {
                    tracing::warn!(attempt, error = %e, "{what} failed, retrying.");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(call().await?)
    }

    async fn fetch_positions(&self, account: AccountId) -> Result<Vec<BridgePosition>> {
        self.retry_read("Open-position query", || {
            self.bridge.get_open_positions(account)
        })
        .await
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

    /// Whether a terminal position matches an order we just submitted but
    /// got no acknowledgement for.
    fn matches_submission(
        raw: &BridgePosition,
        order: &OrderRequest,
        known: &HashMap<u64, Bookkeeping>,
    ) -> bool {
        !known.contains_key(&raw.ticket)
            && raw.symbol == order.symbol.0
            && raw.stack_index == Some(order.stack_index)
            && parse_direction(&raw.direction).is_ok_and(|d| d == order.direction)
    }

    async fn submit(&self, order: &OrderRequest) -> Result<Position> {
        let ack = match self.bridge.place_market_order(order).await {
            Ok(ack) => ack,
            Err(connector::Error::BridgeError { msg, .. }) => {
                return Err(Error::OrderRejected { reason: msg });
            }
            Err(e) if is_transport(&e) => return self.confirm_and_resubmit(order, e).await,
            Err(e) => return Err(e.into()),
        };
        Ok(self.record_open(order, ack).await)
    }

    /// The submission's transport failed mid-flight. Confirm against the
    /// authoritative open set: if the order actually filled, adopt it; if
    /// it verifiably did not, resubmit exactly once; anything murkier is
    /// `SubmissionUnconfirmed` and the caller marks the position failed.
    async fn confirm_and_resubmit(
        &self,
        order: &OrderRequest,
        cause: connector::Error,
    ) -> Result<Position> {
        tracing::warn!(error = %cause, "Order submission transport error, confirming against open set.");

        let raw_positions = match self.fetch_positions(order.account).await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::error!(error = %e, "Could not confirm submission outcome.");
                return Err(Error::SubmissionUnconfirmed);
            }
        };

        let book = self.book.lock().await;
        let filled = raw_positions
            .iter()
            .find(|raw| Self::matches_submission(raw, order, &book))
            .cloned();
        drop(book);

        if let Some(raw) = filled {
            tracing::warn!(ticket = raw.ticket, "Submission filled despite transport error, adopting.");
            let ack = connector::OrderAck {
                ticket: raw.ticket,
                fill_price: raw.entry_price,
                fill_time_ms: raw.entry_time_ms,
            };
            return Ok(self.record_open(order, ack).await);
        }

        // Confirmed unfilled: one resubmission, no further confirmation.
        tracing::warn!("Submission confirmed unfilled, resubmitting once.");
        match self.bridge.place_market_order(order).await {
            Ok(ack) => Ok(self.record_open(order, ack).await),
            Err(connector::Error::BridgeError { msg, .. }) => Err(Error::OrderRejected { reason: msg }),
            Err(e) => {
                tracing::error!(error = %e, "Resubmission failed, outcome unknown.");
                Err(Error::SubmissionUnconfirmed)
            }
        }
    }

    async fn record_open(&self, order: &OrderRequest, ack: connector::OrderAck) -> Position {
        let position = Position {
            ticket: ack.ticket,
            account: order.account,
            symbol: order.symbol.clone(),
            direction: order.direction,
            volume: order.volume,
            entry_price: ack.fill_price,
            entry_time_ms: ack.fill_time_ms,
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

        let mut book = self.book.lock().await;
        book.insert(ack.ticket, Bookkeeping::opened(order.source_id.clone()));
        drop(book);

        tracing::info!(
            ticket = ack.ticket,
            price = %ack.fill_price,
            volume = %order.volume,
            "Live fill: open."
        );
        let _ = self
            .events
            .send(EngineEvent::PositionOpened(Self::position_event(
                &position,
                ack.fill_price,
            )));
        position
    }
}

fn is_transport(error: &connector::Error) -> bool {
    matches!(error, connector::Error::RequestFailed(_))
}

/// Merges a terminal position with the engine's lifecycle sidecar.
fn map_position(
    account: AccountId,
    raw: BridgePosition,
    book: &HashMap<u64, Bookkeeping>,
) -> Result<Position> {
    let direction = parse_direction(&raw.direction)?;
    let entry = book.get(&raw.ticket);
    Ok(Position {
        ticket: raw.ticket,
        account,
        symbol: Symbol(raw.symbol),
        direction,
        volume: raw.volume,
        entry_price: raw.entry_price,
        entry_time_ms: raw.entry_time_ms,
        stop_loss: raw.stop_loss,
        take_profit: raw.take_profit,
        status: entry.map_or(PositionStatus::Open, |b| b.status),
        stack_index: raw.stack_index.unwrap_or(0),
        partials_taken: entry.map_or(0, |b| b.partials_taken),
        source_id: entry.map_or_else(String::new, |b| b.source_id.clone()),
        realized_profit: entry.map_or(Decimal::ZERO, |b| b.realized_profit),
        unrealized_profit: raw.unrealized_profit,
        close_price: None,
        close_time_ms: None,
    })
}

#[async_trait]
impl ExecutionBackend for LiveExecutor {
    fn name(&self) -> &'static str {
        "LiveExecutor"
    }

    async fn open_positions(&self, account: AccountId) -> Result<Vec<Position>> {
        let raw = self.fetch_positions(account).await?;
        let mut book = self.book.lock().await;
        // Tickets the terminal no longer reports are gone (closed at the
        // terminal, stopped out, or manually flattened); drop their
        // bookkeeping so it cannot leak onto a recycled ticket.
        book.retain(|ticket, _| raw.iter().any(|p| p.ticket == *ticket));
        raw.into_iter()
            .map(|p| map_position(account, p, &book))
            .collect()
    }

    async fn account_state(&self, account: AccountId) -> Result<AccountState> {
        let snapshot = self
            .retry_read("Account-state query", || {
                self.bridge.get_account_state(account)
            })
            .await?;
        Ok(AccountState {
            balance: snapshot.balance,
            equity: snapshot.equity,
            margin_free: snapshot.margin_free,
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
        self.submit(order).await
    }

    async fn modify_position(
        &self,
        account: AccountId,
        ticket: u64,
        stop_loss: Decimal,
        take_profit: Decimal,
        status: PositionStatus,
    ) -> Result<()> {
        {
            let book = self.book.lock().await;
            if let Some(entry) = book.get(&ticket) {
                if entry.status != status && !entry.status.can_transition_to(status) {
                    return Err(core_types::Error::IllegalTransition {
                        ticket,
                        from: entry.status,
                        to: status,
                    }
                    .into());
                }
            }
        }

        self.bridge
            .modify_position(account, ticket, stop_loss, take_profit)
            .await?;

        let mut book = self.book.lock().await;
        book.entry(ticket)
            .or_insert_with(|| Bookkeeping::opened(String::new()))
            .status = status;
        drop(book);

        tracing::info!(ticket, stop_loss = %stop_loss, take_profit = %take_profit, ?status, "Live modify.");
        Ok(())
    }

    async fn close_position(
        &self,
        account: AccountId,
        ticket: u64,
        volume: Decimal,
        _price: Option<Decimal>,
        reason: ExitReason,
    ) -> Result<TradeRecord> {
        // Snapshot the position first; the record needs its entry side.
        let raw = self.fetch_positions(account).await?;
        let book = self.book.lock().await;
        let position = raw
            .into_iter()
            .find(|p| p.ticket == ticket)
            .ok_or(Error::UnknownTicket { ticket })
            .and_then(|p| map_position(account, p, &book))?;
        drop(book);

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

        let ack = self.bridge.close_position(account, ticket, volume).await?;

        // The terminal reports profit net of its own commission.
        let record = TradeRecord {
            ticket,
            account,
            symbol: position.symbol.clone(),
            direction: position.direction,
            volume,
            entry_price: position.entry_price,
            entry_time_ms: position.entry_time_ms,
            exit_price: ack.close_price,
            exit_time_ms: ack.close_time_ms,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            profit: ack.profit,
            commission: Decimal::ZERO,
            stack_index: position.stack_index,
            exit_reason: reason,
            source_id: position.source_id.clone(),
        };

        let mut book = self.book.lock().await;
        let mut event_position = position;
        if full_close {
            book.remove(&ticket);
            event_position.status = PositionStatus::Closed;
            event_position.volume = Decimal::ZERO;
            event_position.realized_profit += ack.profit;
            event_position.close_price = Some(ack.close_price);
            event_position.close_time_ms = Some(ack.close_time_ms);
        } else {
            let entry = book
                .entry(ticket)
                .or_insert_with(|| Bookkeeping::opened(String::new()));
            entry.status = PositionStatus::PartiallyClosed;
            entry.partials_taken += 1;
            entry.realized_profit += ack.profit;
            event_position.status = PositionStatus::PartiallyClosed;
            event_position.volume -= volume;
            event_position.realized_profit = entry.realized_profit;
        }
        drop(book);

        tracing::info!(ticket, price = %ack.close_price, volume = %volume, ?reason, "Live fill: close.");
        let event = Self::position_event(&event_position, ack.close_price);
        let _ = self.events.send(if full_close {
            EngineEvent::PositionClosed(event)
        } else {
            EngineEvent::PositionModified(event)
        });
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Direction;
    use rust_decimal_macros::dec;

    fn raw(ticket: u64) -> BridgePosition {
        BridgePosition {
            ticket,
            symbol: "EURUSD".to_string(),
            direction: "buy".to_string(),
            volume: dec!(0.50),
            entry_price: dec!(1.1000),
            entry_time_ms: 1_000,
            stop_loss: dec!(1.0980),
            take_profit: dec!(1.1040),
            unrealized_profit: dec!(12.5),
            stack_index: None,
        }
    }

    #[test]
    fn external_positions_map_with_defaults() {
        let book = HashMap::new();
        let position = map_position(AccountId(7), raw(42), &book).unwrap();

        assert_eq!(position.ticket, 42);
        assert_eq!(position.direction, Direction::Buy);
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.stack_index, 0);
        assert_eq!(position.partials_taken, 0);
        assert!(position.source_id.is_empty());
        assert_eq!(position.unrealized_profit, dec!(12.5));
    }

    #[test]
    fn bookkeeping_overrides_lifecycle_fields() {
        let mut book = HashMap::new();
        book.insert(
            42,
            Bookkeeping {
                status: PositionStatus::Trailing,
                partials_taken: 2,
                source_id: "mean-reversion-v2".to_string(),
                realized_profit: dec!(85),
            },
        );
        let mut terminal = raw(42);
        terminal.stack_index = Some(1);

        let position = map_position(AccountId(7), terminal, &book).unwrap();
        assert_eq!(position.status, PositionStatus::Trailing);
        assert_eq!(position.stack_index, 1);
        assert_eq!(position.partials_taken, 2);
        assert_eq!(position.source_id, "mean-reversion-v2");
        assert_eq!(position.realized_profit, dec!(85));
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let mut terminal = raw(42);
        terminal.direction = "hold".to_string();
        let err = map_position(AccountId(7), terminal, &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Connector(_)));
    }

    #[test]
    fn submission_match_requires_unknown_ticket_and_same_stack_slot() {
        let order = OrderRequest {
            account: AccountId(7),
            symbol: Symbol("EURUSD".to_string()),
            direction: Direction::Buy,
            volume: dec!(0.50),
            stop_loss: dec!(1.0980),
            take_profit: dec!(1.1040),
            stack_index: 1,
            source_id: "test".to_string(),
        };

        let mut terminal = raw(42);
        terminal.stack_index = Some(1);
        let empty = HashMap::new();
        assert!(LiveExecutor::matches_submission(&terminal, &order, &empty));

        // Already-known tickets are never adopted.
        let mut known = HashMap::new();
        known.insert(42, Bookkeeping::opened("test".to_string()));
        assert!(!LiveExecutor::matches_submission(&terminal, &order, &known));

        // A different stack slot belongs to some other order.
        terminal.stack_index = Some(0);
        assert!(!LiveExecutor::matches_submission(&terminal, &order, &empty));
    }
}
