//! In-process bus transport

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{BusError, BusMessage, Subscriber};

/// Create a connected publisher/subscriber pair holding up to `buffer` messages
pub fn channel(buffer: usize) -> (Publisher, ChannelSubscriber) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (Publisher { tx }, ChannelSubscriber { rx })
}

/// Sending half; dropping every clone disconnects the subscriber
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<BusMessage>,
}

impl Publisher {
    /// Publish a message, waiting for buffer space
    pub async fn send(&self, message: BusMessage) -> Result<(), BusError> {
        self.tx.send(message).await.map_err(|_| BusError::Disconnected)
    }

    /// Publish a frame with its metadata
    pub async fn publish(&self, metadata: Value, blob: impl Into<Bytes>) -> Result<(), BusError> {
        self.send(BusMessage::Frame {
            metadata,
            blob: blob.into(),
        })
        .await
    }
}

/// Receiving half
#[derive(Debug)]
pub struct ChannelSubscriber {
    rx: mpsc::Receiver<BusMessage>,
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn recv(&mut self) -> Result<BusMessage, BusError> {
        self.rx.recv().await.ok_or(BusError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_delivery_then_disconnect() {
        let (publisher, mut subscriber) = channel(4);
        publisher.publish(json!({"n": 1}), vec![1u8, 2, 3]).await.unwrap();
        drop(publisher);

        match subscriber.recv().await.unwrap() {
            BusMessage::Frame { metadata, blob } => {
                assert_eq!(metadata["n"], 1);
                assert_eq!(&blob[..], &[1, 2, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(subscriber.recv().await, Err(BusError::Disconnected)));
    }
}
