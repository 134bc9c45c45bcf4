use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Replay has no bars")]
    EmptyReplay,

    #[error("Execution backend error: {0}")]
    Execution(#[from] execution::Error),

    #[error("Lifecycle sweep failed: {0}")]
    Lifecycle(#[from] lifecycle::Error),

    /// A non-policy governor failure; policy rejections are logged and
    /// never surfaced here.
    #[error("Admission failed: {0}")]
    Admission(governor::Error),

    #[error(transparent)]
    Invariant(#[from] core_types::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
