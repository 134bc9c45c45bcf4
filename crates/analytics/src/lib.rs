pub mod engine;
pub mod types;

pub use engine::AnalyticsEngine;
pub use types::{MetricsQuery, PerformanceMetrics};
