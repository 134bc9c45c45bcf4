use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Execution backend error: {0}")]
    Execution(#[from] execution::Error),

    #[error(transparent)]
    Invariant(#[from] core_types::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
