//! Subscriber worker
//!
//! One worker per topic moves messages from the bus into the topic queue:
//!
//! ```text
//! Connecting ──▶ Receiving ──▶ Terminated
//!      │                           ▲
//!      └───── connect failure ─────┘
//! ```
//!
//! Per-message problems (bad metadata, undecodable blobs) are logged and the
//! message is skipped. Losing the bus ends the worker; it is not restarted.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::annotate::{AnnotatedFrame, AnnotationEngine, LabelMap};
use crate::bus::{self, BusError, BusMessage, Subscriber};
use crate::config::{TopicConfig, TransportConfig};
use crate::frame::{DecodeError, FrameDecoder, FrameMessage};
use crate::stream::{PushOutcome, TopicQueue};
use crate::utils::LogThrottler;

/// Decode and annotate settings of one topic
pub struct FramePipeline {
    decoder: FrameDecoder,
    engine: Arc<AnnotationEngine>,
    labels: LabelMap,
    draw_results: bool,
}

impl FramePipeline {
    pub fn new(
        decoder: FrameDecoder,
        engine: Arc<AnnotationEngine>,
        labels: LabelMap,
        draw_results: bool,
    ) -> Self {
        Self {
            decoder,
            engine,
            labels,
            draw_results,
        }
    }

    pub fn from_config(topic: &TopicConfig, engine: Arc<AnnotationEngine>) -> Self {
        Self::new(
            FrameDecoder::new(topic.channel_order),
            engine,
            topic.labels.clone(),
            topic.draw_results,
        )
    }

    /// Decode a frame and draw its annotations
    pub fn process(&self, message: &FrameMessage) -> Result<AnnotatedFrame, DecodeError> {
        let image = self.decoder.decode_frame(&message.header, &message.raw)?;
        if !self.draw_results {
            return Ok(AnnotatedFrame::plain(image));
        }
        Ok(self
            .engine
            .annotate(&message.topic, image, &message.annotations, &self.labels))
    }
}

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Connecting,
    Receiving,
    Terminated,
}

/// Message counters of a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub received: AtomicU64,
    pub queued: AtomicU64,
    pub dropped: AtomicU64,
    pub skipped: AtomicU64,
}

impl WorkerStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Moves one topic's bus messages into its queue
pub struct SubscriberWorker {
    topic: String,
    pipeline: Arc<FramePipeline>,
    queue: Arc<TopicQueue>,
    state: RwLock<WorkerState>,
    stats: WorkerStats,
    throttler: LogThrottler,
}

impl SubscriberWorker {
    pub fn new(pipeline: FramePipeline, queue: Arc<TopicQueue>) -> Self {
        Self {
            topic: queue.topic().to_string(),
            pipeline: Arc::new(pipeline),
            queue,
            state: RwLock::new(WorkerState::Connecting),
            stats: WorkerStats::default(),
            throttler: LogThrottler::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    fn set_state(&self, state: WorkerState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("Worker {} state: {:?} -> {:?}", self.topic, *current, state);
            *current = state;
        }
    }

    /// Connect over `transport`, then receive until the bus goes away
    pub async fn connect_and_run(&self, transport: &TransportConfig, cancel: CancellationToken) {
        self.set_state(WorkerState::Connecting);
        let connected = tokio::select! {
            _ = cancel.cancelled() => {
                self.set_state(WorkerState::Terminated);
                return;
            }
            r = bus::connect(&self.topic, transport) => r,
        };

        match connected {
            Ok(subscriber) => self.run(subscriber, cancel).await,
            Err(e) => {
                error!("Worker for topic {} could not connect: {}", self.topic, e);
                self.set_state(WorkerState::Terminated);
            }
        }
    }

    /// Receive messages from an open subscription until it ends or `cancel` fires
    pub async fn run<S: Subscriber>(&self, mut subscriber: S, cancel: CancellationToken) {
        self.set_state(WorkerState::Receiving);
        info!("Worker for topic {} receiving", self.topic);

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Worker for topic {} stopped", self.topic);
                    break;
                }
                r = subscriber.recv() => r,
            };

            match received {
                Ok(message) => self.handle_message(message).await,
                Err(e) if !e.is_terminal() => {
                    WorkerStats::bump(&self.stats.skipped);
                    if self.throttler.should_log("bus") {
                        warn!("Skipping message on topic {}: {}", self.topic, e);
                    }
                }
                Err(BusError::Disconnected) => {
                    info!("Publisher of topic {} disconnected", self.topic);
                    break;
                }
                Err(e) => {
                    error!("Worker for topic {} terminated: {}", self.topic, e);
                    break;
                }
            }
        }

        self.set_state(WorkerState::Terminated);
        info!(
            "Worker for topic {} finished: {} received, {} queued, {} dropped, {} skipped",
            self.topic,
            WorkerStats::get(&self.stats.received),
            WorkerStats::get(&self.stats.queued),
            WorkerStats::get(&self.stats.dropped),
            WorkerStats::get(&self.stats.skipped),
        );
    }

    /// Validate, decode, annotate and enqueue one message
    pub async fn handle_message(&self, message: BusMessage) {
        WorkerStats::bump(&self.stats.received);

        let (metadata, blob) = match message {
            BusMessage::Metadata(metadata) => {
                debug!("Metrics-only message on topic {}: {}", self.topic, metadata);
                return;
            }
            BusMessage::Frame { metadata, blob } => (metadata, blob),
        };

        let frame = match FrameMessage::from_parts(&self.topic, metadata, blob) {
            Ok(frame) => frame,
            Err(e) => {
                WorkerStats::bump(&self.stats.skipped);
                if self.throttler.should_log("metadata") {
                    warn!("Skipping frame on topic {}: {}", self.topic, e);
                }
                return;
            }
        };

        // Decoding and drawing are CPU bound
        let pipeline = self.pipeline.clone();
        let processed = tokio::task::spawn_blocking(move || pipeline.process(&frame)).await;

        let annotated = match processed {
            Ok(Ok(annotated)) => annotated,
            Ok(Err(e)) => {
                WorkerStats::bump(&self.stats.skipped);
                if self.throttler.should_log("decode") {
                    warn!("Failed to decode frame on topic {}: {}", self.topic, e);
                }
                return;
            }
            Err(e) => {
                WorkerStats::bump(&self.stats.skipped);
                error!("Frame processing task for topic {} failed: {}", self.topic, e);
                return;
            }
        };

        match self.queue.push(annotated) {
            PushOutcome::Queued => WorkerStats::bump(&self.stats.queued),
            PushOutcome::Dropped => WorkerStats::bump(&self.stats.dropped),
        }
    }
}

/// Spawn a worker task that connects over the topic's configured transport
pub fn spawn_worker(
    worker: Arc<SubscriberWorker>,
    transport: TransportConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        worker.connect_and_run(&transport, cancel).await;
    })
}
