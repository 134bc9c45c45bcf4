use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("Order rejected by the venue: {reason}")]
    OrderRejected { reason: String },

    #[error("No open position with ticket {ticket}")]
    UnknownTicket { ticket: u64 },

    #[error("No market price available (stale or missing bar)")]
    StalePrice,

    /// The submission's outcome could not be confirmed either way; the
    /// caller must mark the position FAILED and let the next cycle's
    /// authoritative position query reconcile it.
    #[error("Order submission unconfirmed after retry")]
    SubmissionUnconfirmed,

    #[error("Bridge error: {0}")]
    Connector(#[from] connector::Error),

    #[error(transparent)]
    Invariant(#[from] core_types::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
