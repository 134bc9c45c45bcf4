pub mod admission;
pub mod error;

// Re-export public types
pub use admission::PositionGovernor;
pub use error::{Error, Result};
