//! Ingestion pipeline
//!
//! Bus subscription, decoding, annotation and queueing for each topic.

mod registry;
pub mod worker;

pub use registry::TopicRegistry;
pub use worker::{spawn_worker, FramePipeline, SubscriberWorker, WorkerState, WorkerStats};
