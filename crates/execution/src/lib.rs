use async_trait::async_trait;
use core_types::{
    AccountId, AccountState, ExitReason, OrderRequest, Position, PositionStatus, TradeRecord,
};
use rust_decimal::Decimal;

pub mod error;
pub mod live;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use live::LiveExecutor;
pub use simulated::SimulatedExecutor;
pub use types::SimulationSettings;

/// The universal interface to an order-execution venue.
///
/// Exactly two implementations exist: `LiveExecutor`, which delegates to
/// the external terminal bridge, and `SimulatedExecutor`, which fills
/// against a historical bar stream. The governor and lifecycle manager
/// depend only on this trait, so live and simulated runs share every
/// line of decision logic.
///
/// `open_positions` is the authoritative open set: callers must query it
/// per cycle and never cache it, so positions opened outside the engine
/// are always counted.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// The name of the backend (e.g. "LiveExecutor", "SimulatedExecutor").
    fn name(&self) -> &'static str;

    /// Every currently open position on the account, engine-opened or not.
    async fn open_positions(&self, account: AccountId) -> Result<Vec<Position>>;

    /// The account's balance/equity/free-margin snapshot.
    async fn account_state(&self, account: AccountId) -> Result<AccountState>;

    /// Opens a market position and waits for the fill acknowledgement.
    async fn open_position(&self, order: &OrderRequest) -> Result<Position>;

    /// Updates a position's protective levels and lifecycle status.
    ///
    /// The status accompanies the price levels because the two always
    /// change together (a breakeven move both rewrites the stop and arms
    /// the state); callers must only request transitions the status
    /// table permits.
    async fn modify_position(
        &self,
        account: AccountId,
        ticket: u64,
        stop_loss: Decimal,
        take_profit: Decimal,
        status: PositionStatus,
    ) -> Result<()>;

    /// Closes `volume` lots of a position at market.
    ///
    /// `price` is the trigger level for protective closes; the simulated
    /// backend fills exactly there (not at bar close), the live backend
    /// ignores it and reports the terminal's actual fill.
    async fn close_position(
        &self,
        account: AccountId,
        ticket: u64,
        volume: Decimal,
        price: Option<Decimal>,
        reason: ExitReason,
    ) -> Result<TradeRecord>;
}
