use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Stop distance must be positive, got {pips} pips")]
    NonPositiveStopDistance { pips: Decimal },

    #[error("Sized volume rounds to zero (risk amount {risk_amount}, loss per lot {loss_per_lot})")]
    VolumeRoundsToZero {
        risk_amount: Decimal,
        loss_per_lot: Decimal,
    },

    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Error>;
