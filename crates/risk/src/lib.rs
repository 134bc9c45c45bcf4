pub mod error;
pub mod sizer;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use sizer::RiskSizer;
pub use types::RiskProfile;
