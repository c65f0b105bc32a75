//! Detection visualizer
//!
//! Subscribes to camera topics on a message bus, draws the detection results
//! that arrive with each frame and serves every topic as a browser-viewable
//! MJPEG stream behind a login.

pub mod annotate;
pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod state;
pub mod stream;
pub mod utils;
pub mod web;

pub use error::{AppError, Result};
