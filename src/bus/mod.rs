//! Message bus client
//!
//! A subscription yields `(metadata, blob)` pairs for one topic until the
//! publisher goes away. Two transports are provided:
//!
//! - `channel` - in-process tokio channel, for embedding and tests
//! - `socket` - length-delimited frames over TCP or a local socket
//!
//! # Wire format
//!
//! Each bus frame carries one message:
//!
//! ```text
//! +-------------------+----------------+-----------+
//! | meta len (u32 BE) | metadata JSON  | blob      |
//! +-------------------+----------------+-----------+
//! ```
//!
//! An empty blob marks a metrics-only message.

pub mod channel;
pub mod socket;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;

pub use channel::{channel, ChannelSubscriber, Publisher};
pub use socket::{connect, SocketSubscriber};

/// Bus error
#[derive(Error, Debug)]
pub enum BusError {
    #[error("publisher disconnected")]
    Disconnected,

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bus message: {0}")]
    Malformed(String),

    #[error("unsupported transport: {0}")]
    Unsupported(String),
}

impl BusError {
    /// Whether the subscription cannot deliver any further messages
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BusError::Malformed(_))
    }
}

/// One message received on a topic
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// Frame blob with its metadata
    Frame { metadata: Value, blob: Bytes },
    /// Metadata without a frame
    Metadata(Value),
}

impl BusMessage {
    pub fn metadata(&self) -> &Value {
        match self {
            BusMessage::Frame { metadata, .. } | BusMessage::Metadata(metadata) => metadata,
        }
    }
}

/// Subscription to a single topic
#[async_trait]
pub trait Subscriber: Send {
    /// Wait for the next message
    async fn recv(&mut self) -> Result<BusMessage, BusError>;
}

#[async_trait]
impl<S: Subscriber + ?Sized> Subscriber for Box<S> {
    async fn recv(&mut self) -> Result<BusMessage, BusError> {
        (**self).recv().await
    }
}

/// Serialize a message into a bus frame payload
pub fn encode_message(message: &BusMessage) -> Result<Bytes, BusError> {
    let meta = serde_json::to_vec(message.metadata())
        .map_err(|e| BusError::Malformed(e.to_string()))?;
    let meta_len = u32::try_from(meta.len())
        .map_err(|_| BusError::Malformed(format!("metadata too large: {} bytes", meta.len())))?;
    let blob: &[u8] = match message {
        BusMessage::Frame { blob, .. } => &blob[..],
        BusMessage::Metadata(_) => &[],
    };

    let mut buf = BytesMut::with_capacity(4 + meta.len() + blob.len());
    buf.put_u32(meta_len);
    buf.put_slice(&meta);
    buf.put_slice(blob);
    Ok(buf.freeze())
}

/// Parse a bus frame payload
pub fn decode_message(mut payload: Bytes) -> Result<BusMessage, BusError> {
    if payload.len() < 4 {
        return Err(BusError::Malformed(format!(
            "frame of {} bytes has no metadata header",
            payload.len()
        )));
    }
    let meta_len = payload.get_u32() as usize;
    if meta_len > payload.len() {
        return Err(BusError::Malformed(format!(
            "metadata length {} exceeds frame of {} bytes",
            meta_len,
            payload.len()
        )));
    }

    let meta = payload.split_to(meta_len);
    let metadata: Value =
        serde_json::from_slice(&meta).map_err(|e| BusError::Malformed(e.to_string()))?;

    if payload.is_empty() {
        Ok(BusMessage::Metadata(metadata))
    } else {
        Ok(BusMessage::Frame {
            metadata,
            blob: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_payload_layout() {
        let msg = BusMessage::Frame {
            metadata: json!({"a": 1}),
            blob: Bytes::from_static(&[9, 9]),
        };
        let payload = encode_message(&msg).unwrap();
        assert_eq!(&payload[..4], &[0, 0, 0, 7]);
        assert_eq!(&payload[4..11], br#"{"a":1}"#);
        assert_eq!(&payload[11..], &[9, 9]);
        assert_eq!(decode_message(payload).unwrap(), msg);
    }

    #[test]
    fn test_empty_blob_is_metadata_only() {
        let payload = encode_message(&BusMessage::Metadata(json!({"fps": 30}))).unwrap();
        assert!(matches!(
            decode_message(payload).unwrap(),
            BusMessage::Metadata(_)
        ));
    }

    #[test]
    fn test_malformed_payloads() {
        for payload in [
            Bytes::from_static(&[0, 0]),
            Bytes::from_static(&[0, 0, 0, 50, b'{']),
            Bytes::from_static(&[0, 0, 0, 2, b'{', b'x']),
        ] {
            let err = decode_message(payload).unwrap_err();
            assert!(matches!(err, BusError::Malformed(_)));
            assert!(!err.is_terminal());
        }
        assert!(BusError::Disconnected.is_terminal());
    }
}
