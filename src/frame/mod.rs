//! Frame ingestion
//!
//! - `message` - typed bus metadata and detection normalization
//! - `decoder` - blob to RGB image decoding

pub mod decoder;
pub mod message;

pub use decoder::{ChannelOrder, DecodeError, FrameDecoder};
pub use message::{
    Annotations, BoundingBox, CornerPairBox, Detection, DisplayNote, Encoding, FrameHeader,
    FrameMessage, GeometricBox, LabelPlacement, LabelRef, MetadataError, Priority, TensorLabel,
};
