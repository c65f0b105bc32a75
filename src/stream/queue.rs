//! Per-topic frame queue
//!
//! A bounded FIFO between a topic's subscriber worker and the viewers
//! streaming that topic. Producers never block: a full queue drops the
//! incoming frame. Consumers never block either: `try_pop` returns `None` when
//! there is nothing new.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::annotate::AnnotatedFrame;
use crate::utils::LogThrottler;

/// Result of [`TopicQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full, the frame was discarded
    Dropped,
}

/// A frame taken from the queue
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    /// Monotonic sequence number assigned on push
    pub seq: u64,
    pub frame: Arc<AnnotatedFrame>,
}

/// Bounded frame queue for one topic
pub struct TopicQueue {
    topic: String,
    capacity: usize,
    frames: Mutex<VecDeque<QueuedFrame>>,
    /// Last encoded chunk, shared between viewers
    latest: RwLock<Option<(u64, Bytes)>>,
    sequence: AtomicU64,
    dropped: AtomicU64,
    viewers: AtomicUsize,
    throttler: LogThrottler,
}

impl TopicQueue {
    /// Create a queue; `capacity` is clamped to at least one slot
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            topic: topic.into(),
            capacity,
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            latest: RwLock::new(None),
            sequence: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            viewers: AtomicUsize::new(0),
            throttler: LogThrottler::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Frames discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueue a frame without blocking
    pub fn push(&self, frame: AnnotatedFrame) -> PushOutcome {
        let mut frames = self.frames.lock();
        if frames.len() >= self.capacity {
            drop(frames);
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if self.throttler.should_log("full") {
                warn!(
                    "Queue for topic {} is full ({} frames), dropping frame ({} dropped so far)",
                    self.topic, self.capacity, total
                );
            }
            return PushOutcome::Dropped;
        }

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        frames.push_back(QueuedFrame {
            seq,
            frame: Arc::new(frame),
        });
        PushOutcome::Queued
    }

    /// Take the oldest frame, if any
    pub fn try_pop(&self) -> Option<QueuedFrame> {
        self.frames.lock().pop_front()
    }

    /// Publish an encoded chunk so other viewers of this topic can reuse it
    ///
    /// Older chunks never replace newer ones.
    pub fn share_latest(&self, seq: u64, chunk: Bytes) {
        let mut latest = self.latest.write();
        match latest.as_ref() {
            Some((current, _)) if *current >= seq => {}
            _ => *latest = Some((seq, chunk)),
        }
    }

    /// Most recent chunk published by any viewer
    pub fn latest(&self) -> Option<(u64, Bytes)> {
        self.latest.read().clone()
    }

    /// Current number of connected viewers
    pub fn viewer_count(&self) -> usize {
        self.viewers.load(Ordering::Relaxed)
    }

    fn register_viewer(&self, viewer_id: &str) {
        let total = self.viewers.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Viewer {} connected to topic {} (total: {})",
            viewer_id, self.topic, total
        );
    }

    fn unregister_viewer(&self, viewer_id: &str, connected_at: Instant, frames_sent: u64) {
        let total = self.viewers.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        let duration_secs = connected_at.elapsed().as_secs_f32();
        let avg_fps = if duration_secs > 0.1 {
            frames_sent as f32 / duration_secs
        } else {
            0.0
        };
        info!(
            "Viewer {} left topic {} after {:.1}s ({} frames, {:.1} avg FPS, {} remaining)",
            viewer_id, self.topic, duration_secs, frames_sent, avg_fps, total
        );
    }
}

impl std::fmt::Debug for TopicQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicQueue")
            .field("topic", &self.topic)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// RAII registration of a viewer on a topic
///
/// Unregisters on drop, including when the HTTP client disconnects mid-stream.
pub struct ViewerGuard {
    viewer_id: String,
    queue: Arc<TopicQueue>,
    connected_at: Instant,
    frames_sent: AtomicU64,
}

impl ViewerGuard {
    pub fn new(viewer_id: impl Into<String>, queue: Arc<TopicQueue>) -> Self {
        let viewer_id = viewer_id.into();
        queue.register_viewer(&viewer_id);
        Self {
            viewer_id,
            queue,
            connected_at: Instant::now(),
            frames_sent: AtomicU64::new(0),
        }
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.queue.unregister_viewer(
            &self.viewer_id,
            self.connected_at,
            self.frames_sent.load(Ordering::Relaxed),
        );
    }
}
