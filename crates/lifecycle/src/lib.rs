pub mod error;
pub mod manager;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use manager::LifecycleManager;
pub use types::{LifecycleSettings, PartialCloseLevel, PlannedAction, PriceView};
