//! Per-viewer MJPEG chunk producer
//!
//! Each streaming request owns a [`StreamEncoder`]. It pulls annotated frames
//! from the topic queue, JPEG-encodes them into multipart parts and remembers
//! the last part so a stalled topic keeps showing its most recent picture.

use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use std::sync::Arc;
use tracing::{debug, warn};

use super::queue::TopicQueue;
use crate::annotate::{TextOverlay, Typeface};

const PLACEHOLDER_MIN_WIDTH: u32 = 200;
const PLACEHOLDER_HEIGHT: u32 = 130;
const PLACEHOLDER_CHAR_WIDTH: u32 = 10;
const PLACEHOLDER_TEXT_SCALE: f32 = 16.0;

/// Multipart boundary used by every stream
pub const BOUNDARY: &str = "frame";

/// One chunk of the multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// A frame this viewer has not sent before
    Fresh(Bytes),
    /// The previous chunk again
    Cached(Bytes),
}

impl StreamChunk {
    pub fn is_fresh(&self) -> bool {
        matches!(self, StreamChunk::Fresh(_))
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            StreamChunk::Fresh(b) | StreamChunk::Cached(b) => b,
        }
    }
}

/// Produces multipart JPEG parts for one viewer
pub struct StreamEncoder {
    topic: String,
    queue: Option<Arc<TopicQueue>>,
    quality: u8,
    cached: Bytes,
    last_seq: u64,
}

impl StreamEncoder {
    /// Create an encoder for `topic`; `queue` is `None` for unknown topics
    pub fn new(
        topic: impl Into<String>,
        queue: Option<Arc<TopicQueue>>,
        quality: u8,
        typeface: &Typeface,
    ) -> Self {
        let topic = topic.into();
        let text = match queue {
            Some(_) => "Disconnected".to_string(),
            None => format!("Topic Not Found: {}", topic),
        };

        let cached = match encode_jpeg(&placeholder(&text, typeface), quality) {
            Ok(jpeg) => create_mjpeg_part(&jpeg),
            Err(e) => {
                warn!("Failed to encode placeholder for topic {}: {}", topic, e);
                Bytes::new()
            }
        };

        Self {
            topic,
            queue,
            quality: quality.clamp(1, 100),
            cached,
            last_seq: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Produce the next chunk
    ///
    /// Never waits for the topic; JPEG encoding runs on the blocking pool.
    pub async fn poll_chunk(&mut self) -> StreamChunk {
        let Some(queue) = self.queue.clone() else {
            return StreamChunk::Cached(self.cached.clone());
        };

        if let Some(queued) = queue.try_pop() {
            let seq = queued.seq;
            let quality = self.quality;
            let encoded =
                tokio::task::spawn_blocking(move || encode_jpeg(&queued.frame.image, quality))
                    .await;

            match encoded {
                Ok(Ok(jpeg)) => {
                    let part = create_mjpeg_part(&jpeg);
                    queue.share_latest(seq, part.clone());
                    self.cached = part.clone();
                    self.last_seq = seq;
                    return StreamChunk::Fresh(part);
                }
                Ok(Err(e)) => {
                    warn!("Failed to encode frame {} of topic {}: {}", seq, self.topic, e);
                }
                Err(e) => {
                    warn!("Encoding task for topic {} failed: {}", self.topic, e);
                }
            }
            return StreamChunk::Cached(self.cached.clone());
        }

        // Another viewer may have taken a newer frame off the queue
        if let Some((seq, part)) = queue.latest() {
            if seq > self.last_seq {
                debug!("Reusing frame {} of topic {} from another viewer", seq, self.topic);
                self.last_seq = seq;
                self.cached = part.clone();
                return StreamChunk::Fresh(part);
            }
        }

        StreamChunk::Cached(self.cached.clone())
    }

    /// Bytes of the next chunk
    pub async fn next_chunk(&mut self) -> Bytes {
        self.poll_chunk().await.into_bytes()
    }
}

/// Encode an RGB image as baseline JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buf)
}

/// Wrap a JPEG in a multipart part
pub fn create_mjpeg_part(jpeg_data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(128 + jpeg_data.len());

    buf.put_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    buf.put_slice(b"Content-Type: image/jpeg\r\n");
    buf.put_slice(format!("Content-Length: {}\r\n", jpeg_data.len()).as_bytes());
    buf.put_slice(b"\r\n");

    buf.put_slice(jpeg_data);
    buf.put_slice(b"\r\n");

    buf.freeze()
}

/// Black frame with a white status line
fn placeholder(text: &str, typeface: &Typeface) -> RgbImage {
    let width = PLACEHOLDER_MIN_WIDTH.max(20 + PLACEHOLDER_CHAR_WIDTH * text.chars().count() as u32);
    let mut image = RgbImage::from_pixel(width, PLACEHOLDER_HEIGHT, Rgb([0, 0, 0]));
    typeface.draw(
        &mut image,
        &TextOverlay {
            text: text.to_string(),
            x: 10,
            y: (PLACEHOLDER_HEIGHT as i32 - PLACEHOLDER_TEXT_SCALE as i32) / 2,
            color: [255, 255, 255],
            scale: PLACEHOLDER_TEXT_SCALE,
        },
    );
    image
}
