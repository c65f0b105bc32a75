//! Frame streaming
//!
//! # Components
//!
//! - `TopicQueue` - bounded per-topic queue between worker and viewers
//! - `StreamEncoder` - per-viewer JPEG multipart producer
//! - `mjpeg` - HTTP body and response for `multipart/x-mixed-replace`

pub mod encoder;
pub mod mjpeg;
pub mod queue;

pub use encoder::{create_mjpeg_part, encode_jpeg, StreamChunk, StreamEncoder};
pub use mjpeg::mjpeg_response;
pub use queue::{PushOutcome, QueuedFrame, TopicQueue, ViewerGuard};
