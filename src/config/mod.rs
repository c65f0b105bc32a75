//! Configuration
//!
//! The configuration is a single JSON document loaded once at startup. Every
//! section carries serde defaults, so a file only needs the values that
//! differ. Environment and CLI overrides are applied on top, then the result
//! is validated before anything is started.

mod loader;
mod schema;

pub use loader::{load, validate, ConfigError, CONFIG_ENV, DEFAULT_CONFIG_PATH, DEV_MODE_ENV};
pub use schema::*;
