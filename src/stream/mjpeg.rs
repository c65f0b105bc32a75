//! MJPEG HTTP body
//!
//! The response body is an endless, lazily polled stream of multipart parts.
//! Each poll asks the viewer's [`StreamEncoder`] for a chunk; after a chunk
//! that carried nothing new, the stream sleeps for the idle interval so a
//! stalled topic does not spin.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use std::time::Duration;

use super::encoder::{StreamEncoder, BOUNDARY};
use super::queue::ViewerGuard;

/// Endless chunk stream for one viewer
///
/// `guard` is held for the lifetime of the stream and unregisters the viewer
/// when the client goes away.
pub fn chunk_stream(
    mut encoder: StreamEncoder,
    guard: Option<ViewerGuard>,
    idle_interval: Duration,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    async_stream::stream! {
        loop {
            let chunk = encoder.poll_chunk().await;
            let fresh = chunk.is_fresh();
            yield Ok::<Bytes, std::io::Error>(chunk.into_bytes());

            if fresh {
                if let Some(guard) = &guard {
                    guard.record_frame_sent();
                }
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(idle_interval).await;
            }
        }
    }
}

/// Build the `multipart/x-mixed-replace` response for a viewer
pub fn mjpeg_response(
    encoder: StreamEncoder,
    guard: Option<ViewerGuard>,
    idle_interval: Duration,
) -> Response {
    let content_type = format!("multipart/x-mixed-replace; boundary={}", BOUNDARY);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
        ],
        Body::from_stream(chunk_stream(encoder, guard, idle_interval)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{AnnotatedFrame, Typeface};
    use crate::stream::TopicQueue;
    use futures::StreamExt;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_stream_yields_placeholder_then_frames() {
        let queue = Arc::new(TopicQueue::new("cam", 4));
        let typeface = Typeface::builtin().unwrap();
        let encoder = StreamEncoder::new("cam", Some(queue.clone()), 80, &typeface);
        let guard = ViewerGuard::new("v1", queue.clone());
        let stream = chunk_stream(encoder, Some(guard), Duration::from_millis(50));
        futures::pin_mut!(stream);

        let placeholder = stream.next().await.unwrap().unwrap();
        assert!(placeholder.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
        assert_eq!(queue.viewer_count(), 1);

        queue.push(AnnotatedFrame::plain(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))));
        let frame = stream.next().await.unwrap().unwrap();
        assert_ne!(frame, placeholder);
    }

    #[tokio::test]
    async fn test_response_headers() {
        let encoder = StreamEncoder::new("missing", None, 80, &Typeface::builtin().unwrap());
        let response = mjpeg_response(encoder, None, Duration::from_millis(10));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    }
}
