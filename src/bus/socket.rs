//! Socket bus transport
//!
//! Frames are length-delimited (`u32` big-endian prefix) and carry the
//! payload described in the module docs of [`crate::bus`]. Right after
//! connecting, the subscriber sends one handshake frame naming its topic.
//! The stream itself is plaintext; run it over a trusted network or a local
//! socket.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info};

use super::{decode_message, BusError, BusMessage, Subscriber};
use crate::config::{TransportConfig, TransportMode};

/// Largest accepted bus frame
const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

#[derive(Serialize)]
struct Handshake<'a> {
    topic: &'a str,
}

/// Length-delimited codec shared by both ends of the socket transport
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Subscription over a TCP or local socket
pub struct SocketSubscriber {
    topic: String,
    framed: Framed<Box<dyn Io>, LengthDelimitedCodec>,
}

impl std::fmt::Debug for SocketSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSubscriber")
            .field("topic", &self.topic)
            .finish()
    }
}

/// Connect to the publisher of `topic` and subscribe
pub async fn connect(topic: &str, transport: &TransportConfig) -> Result<SocketSubscriber, BusError> {
    let stream = open(transport).await?;
    let mut framed = Framed::new(stream, codec());

    let handshake = Handshake { topic };
    let payload =
        serde_json::to_vec(&handshake).map_err(|e| BusError::Malformed(e.to_string()))?;
    framed.send(Bytes::from(payload)).await?;

    info!(
        "Subscribed to topic {} via {:?} {}",
        topic, transport.mode, transport.address
    );
    Ok(SocketSubscriber {
        topic: topic.to_string(),
        framed,
    })
}

async fn open(transport: &TransportConfig) -> Result<Box<dyn Io>, BusError> {
    let address = transport.address.trim();
    match transport.mode {
        TransportMode::Tcp => {
            let address = address.strip_prefix("tcp://").unwrap_or(address);
            debug!("Connecting to tcp {}", address);
            let stream = TcpStream::connect(address)
                .await
                .map_err(|source| BusError::Connect {
                    address: address.to_string(),
                    source,
                })?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        TransportMode::Ipc => {
            let path = address.strip_prefix("ipc://").unwrap_or(address);
            debug!("Connecting to socket {}", path);
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(|source| BusError::Connect {
                    address: path.to_string(),
                    source,
                })?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        TransportMode::Ipc => Err(BusError::Unsupported(
            "ipc transport requires a unix platform".to_string(),
        )),
    }
}

#[async_trait]
impl Subscriber for SocketSubscriber {
    async fn recv(&mut self) -> Result<BusMessage, BusError> {
        match self.framed.next().await {
            Some(Ok(frame)) => decode_message(frame.freeze()),
            Some(Err(e)) => Err(BusError::Io(e)),
            None => Err(BusError::Disconnected),
        }
    }
}
