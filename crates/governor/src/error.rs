use core_types::{Direction, Symbol};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cooldown active for {symbol}: {remaining_ms}ms remaining")]
    Cooldown { symbol: Symbol, remaining_ms: i64 },

    #[error("Stacking limit reached for {symbol} {direction:?}: {open} open, max {max}")]
    StackingLimit {
        symbol: Symbol,
        direction: Direction,
        open: u32,
        max: u32,
    },

    #[error("Position cap reached for {scope}: {open} open, max {max}")]
    PortfolioLimit {
        scope: String,
        open: u32,
        max: u32,
    },

    #[error("Exposure cap exceeded: projected {projected}, cap {cap}")]
    ExposureLimit { projected: Decimal, cap: Decimal },

    #[error("Insufficient margin: required {required}, free {available}")]
    InsufficientMargin {
        required: Decimal,
        available: Decimal,
    },

    #[error("Sizing rejected the order: {0}")]
    Sizing(#[from] risk::Error),

    #[error("Execution backend error: {0}")]
    Execution(#[from] execution::Error),

    #[error(transparent)]
    Invariant(#[from] core_types::Error),
}

impl Error {
    /// Policy rejections are expected outcomes: logged, surfaced typed,
    /// never retried and never alerted on. Execution failures and
    /// invariant violations are neither.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Error::Cooldown { .. }
                | Error::StackingLimit { .. }
                | Error::PortfolioLimit { .. }
                | Error::ExposureLimit { .. }
                | Error::InsufficientMargin { .. }
                | Error::Sizing(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
