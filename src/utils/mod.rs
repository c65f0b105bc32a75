//! Utility modules shared across the pipeline and the web layer.

pub mod throttle;

pub use throttle::LogThrottler;
