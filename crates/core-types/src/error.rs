use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A programming error: a state or value the type system could not
    /// rule out but the domain forbids. Callers must refuse the
    /// operation rather than repair the state.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Illegal position transition: {from:?} -> {to:?} on ticket {ticket}")]
    IllegalTransition {
        ticket: u64,
        from: crate::types::PositionStatus,
        to: crate::types::PositionStatus,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
