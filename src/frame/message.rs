//! Bus message schema
//!
//! Metadata arrives as a loosely typed JSON record next to the raw frame blob.
//! It is validated here, once, into [`FrameMessage`]; everything downstream
//! works on the typed form. Two detection layouts are seen on the wire:
//! `gva_meta` (x/y/width/height boxes with tensor labels) and `defects`
//! (`tl`/`br` corner pairs with a `type`). Both are normalized into
//! [`BoundingBox`] before rendering.

use bytes::Bytes;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Metadata validation error
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata is not a JSON object")]
    NotAnObject,

    #[error("malformed frame metadata: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Compression descriptor of a frame blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    /// Codec name as published (e.g. "jpeg", "png"); may be empty
    pub kind: String,
    /// Publisher-side compression level
    pub level: Option<u32>,
}

/// Shape of the frame carried in the blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub encoding: Option<Encoding>,
}

/// Display note priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(Priority::Low),
                Some(1) => Ok(Priority::Medium),
                Some(2) => Ok(Priority::High),
                _ => Err(de::Error::custom(format!("unknown priority {}", n))),
            },
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "low" => Ok(Priority::Low),
                "medium" => Ok(Priority::Medium),
                "high" => Ok(Priority::High),
                other => Err(de::Error::custom(format!("unknown priority '{}'", other))),
            },
            other => Err(de::Error::custom(format!("invalid priority {}", other))),
        }
    }
}

/// Text message shown on top of the frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisplayNote {
    pub priority: Priority,
    #[serde(alias = "info")]
    pub text: String,
}

/// One label entry attached to a geometric box
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TensorLabel {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub label_id: Option<i64>,
}

/// Box given by origin and size
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeometricBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub label_id: Option<i64>,
    #[serde(default)]
    pub tensor: Vec<TensorLabel>,
}

/// Box given by two corners
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CornerPairBox {
    #[serde(alias = "tl")]
    pub top_left: (f64, f64),
    #[serde(alias = "br")]
    pub bottom_right: (f64, f64),
    /// Defect type, looked up in the topic's label map
    #[serde(rename = "type", default)]
    pub kind: Option<Value>,
}

/// A located, optionally labeled finding
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Geometric(GeometricBox),
    CornerPair(CornerPairBox),
}

/// Reference to the text drawn next to a box
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRef {
    /// Literal text supplied by the publisher
    Text(String),
    /// Key into the topic's label map
    Key(String),
}

/// Where a box's labels go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPlacement {
    /// Stacked upwards from the top-left corner
    AboveTopLeft,
    /// A single line under the box
    BelowBox,
}

/// Shape-agnostic box handed to the annotation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingBox {
    pub top_left: (i32, i32),
    pub bottom_right: (i32, i32),
    pub labels: Vec<LabelRef>,
    pub placement: LabelPlacement,
}

impl Detection {
    /// Normalize into a [`BoundingBox`] with ordered corners
    pub fn normalize(&self) -> BoundingBox {
        match self {
            Detection::Geometric(b) => {
                let mut labels = Vec::new();
                if let Some(id) = b.label_id {
                    labels.push(LabelRef::Key(id.to_string()));
                }
                for entry in &b.tensor {
                    match (&entry.label, entry.label_id) {
                        (Some(text), _) if !text.is_empty() => {
                            labels.push(LabelRef::Text(text.clone()))
                        }
                        (_, Some(id)) => labels.push(LabelRef::Key(id.to_string())),
                        _ => {}
                    }
                }
                ordered_box(
                    (b.x, b.y),
                    (b.x + b.width, b.y + b.height),
                    labels,
                    LabelPlacement::AboveTopLeft,
                )
            }
            Detection::CornerPair(b) => {
                let labels = match &b.kind {
                    Some(Value::String(s)) => vec![LabelRef::Key(s.clone())],
                    Some(Value::Number(n)) => {
                        // Integral floats ("1.0") map to the same key as "1"
                        let key = match n.as_f64() {
                            Some(f) if n.is_f64() && f.fract() == 0.0 => format!("{}", f as i64),
                            _ => n.to_string(),
                        };
                        vec![LabelRef::Key(key)]
                    }
                    _ => Vec::new(),
                };
                ordered_box(b.top_left, b.bottom_right, labels, LabelPlacement::BelowBox)
            }
        }
    }
}

fn ordered_box(
    a: (f64, f64),
    b: (f64, f64),
    labels: Vec<LabelRef>,
    placement: LabelPlacement,
) -> BoundingBox {
    let (x1, x2) = (a.0.min(b.0), a.0.max(b.0));
    let (y1, y2) = (a.1.min(b.1), a.1.max(b.1));
    BoundingBox {
        top_left: (to_px(x1), to_px(y1)),
        bottom_right: (to_px(x2), to_px(y2)),
        labels,
        placement,
    }
}

fn to_px(v: f64) -> i32 {
    v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Everything drawn on top of a decoded frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub detections: Vec<Detection>,
    pub display_info: Vec<DisplayNote>,
    /// Metadata keys not covered by the schema
    pub extra_metrics: Map<String, Value>,
}

/// A validated frame received on a topic
#[derive(Debug, Clone)]
pub struct FrameMessage {
    pub topic: String,
    pub header: FrameHeader,
    pub raw: Bytes,
    pub annotations: Annotations,
}

impl FrameMessage {
    /// Validate bus metadata and pair it with the frame blob
    pub fn from_parts(topic: &str, metadata: Value, raw: Bytes) -> Result<Self, MetadataError> {
        if !metadata.is_object() {
            return Err(MetadataError::NotAnObject);
        }
        let wire: WireMetadata = serde_json::from_value(metadata)?;

        let encoding = if wire.encoding_type.is_some() || wire.encoding_level.is_some() {
            Some(Encoding {
                kind: wire.encoding_type.unwrap_or_default(),
                level: wire.encoding_level,
            })
        } else {
            None
        };

        let detections = wire
            .gva_meta
            .into_iter()
            .map(Detection::Geometric)
            .chain(wire.defects.into_iter().map(Detection::CornerPair))
            .collect();

        Ok(Self {
            topic: topic.to_string(),
            header: FrameHeader {
                width: wire.width,
                height: wire.height,
                channels: wire.channels,
                encoding,
            },
            raw,
            annotations: Annotations {
                detections,
                display_info: wire.display_info,
                extra_metrics: wire.extra,
            },
        })
    }
}

/// Metadata as it appears on the bus
#[derive(Debug, Deserialize)]
struct WireMetadata {
    #[serde(deserialize_with = "lenient_u32")]
    width: u32,
    #[serde(deserialize_with = "lenient_u32")]
    height: u32,
    #[serde(deserialize_with = "lenient_u32")]
    channels: u32,
    #[serde(default)]
    encoding_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    encoding_level: Option<u32>,
    #[serde(default)]
    gva_meta: Vec<GeometricBox>,
    #[serde(default)]
    defects: Vec<CornerPairBox>,
    #[serde(default, deserialize_with = "display_notes")]
    display_info: Vec<DisplayNote>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn into_u32<E: de::Error>(self) -> Result<u32, E> {
        match self {
            NumberOrString::Number(n) => u32::try_from(n).map_err(E::custom),
            NumberOrString::String(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_u32()
}

fn lenient_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u32)
        .transpose()
}

/// `display_info` is published either as an array or as a JSON-encoded string
fn display_notes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<DisplayNote>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Notes {
        List(Vec<DisplayNote>),
        Encoded(String),
        Null(()),
    }

    match Notes::deserialize(deserializer)? {
        Notes::List(notes) => Ok(notes),
        Notes::Encoded(s) if s.trim().is_empty() => Ok(Vec::new()),
        Notes::Encoded(s) => serde_json::from_str(&s).map_err(de::Error::custom),
        Notes::Null(()) => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_defect_metadata() {
        let meta = json!({
            "height": 480,
            "width": 640,
            "channels": 3,
            "defects": [{"tl": [10, 20], "br": [50, 60], "type": 1}],
            "img_handle": "a1b2c3",
        });
        let msg = FrameMessage::from_parts("camera1", meta, Bytes::new()).unwrap();

        assert_eq!(msg.topic, "camera1");
        assert_eq!(msg.header.width, 640);
        assert_eq!(msg.header.encoding, None);
        assert_eq!(msg.annotations.detections.len(), 1);
        assert_eq!(msg.annotations.extra_metrics.get("img_handle"), Some(&json!("a1b2c3")));
        assert!(!msg.annotations.extra_metrics.contains_key("defects"));

        let bbox = msg.annotations.detections[0].normalize();
        assert_eq!(bbox.top_left, (10, 20));
        assert_eq!(bbox.bottom_right, (50, 60));
        assert_eq!(bbox.labels, vec![LabelRef::Key("1".to_string())]);
        assert_eq!(bbox.placement, LabelPlacement::BelowBox);
    }

    #[test]
    fn test_parse_geometric_metadata() {
        let meta = json!({
            "height": "480",
            "width": "640",
            "channels": "3",
            "encoding_type": "jpeg",
            "encoding_level": 95,
            "gva_meta": [{
                "x": 10, "y": 10, "width": 20, "height": 20,
                "label_id": 5,
                "tensor": [{"label": "person", "label_id": 1}, {"label_id": 2}, {}]
            }],
        });
        let msg = FrameMessage::from_parts("camera2", meta, Bytes::new()).unwrap();

        assert_eq!(msg.header.height, 480);
        assert_eq!(
            msg.header.encoding,
            Some(Encoding {
                kind: "jpeg".to_string(),
                level: Some(95)
            })
        );

        let bbox = msg.annotations.detections[0].normalize();
        assert_eq!(bbox.top_left, (10, 10));
        assert_eq!(bbox.bottom_right, (30, 30));
        assert_eq!(
            bbox.labels,
            vec![
                LabelRef::Key("5".to_string()),
                LabelRef::Text("person".to_string()),
                LabelRef::Key("2".to_string()),
            ]
        );
        assert_eq!(bbox.placement, LabelPlacement::AboveTopLeft);
    }

    #[test]
    fn test_display_info_as_encoded_string() {
        let meta = json!({
            "height": 2, "width": 2, "channels": 3,
            "display_info": "[{\"priority\": 0, \"info\": \"ok\"}, {\"priority\": 2, \"info\": \"alarm\"}]",
        });
        let msg = FrameMessage::from_parts("t", meta, Bytes::new()).unwrap();
        let notes = &msg.annotations.display_info;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].priority, Priority::Low);
        assert_eq!(notes[1].text, "alarm");
        assert_eq!(notes[1].priority, Priority::High);
    }

    #[test]
    fn test_display_info_as_list_with_names() {
        let meta = json!({
            "height": 2, "width": 2, "channels": 3,
            "display_info": [{"priority": "MEDIUM", "text": "check belt"}],
        });
        let msg = FrameMessage::from_parts("t", meta, Bytes::new()).unwrap();
        assert_eq!(msg.annotations.display_info[0].priority, Priority::Medium);
    }

    #[test]
    fn test_corner_order_is_normalized() {
        let det = Detection::CornerPair(CornerPairBox {
            top_left: (50.0, 60.0),
            bottom_right: (10.4, 20.6),
            kind: Some(json!(3.0)),
        });
        let bbox = det.normalize();
        assert_eq!(bbox.top_left, (10, 21));
        assert_eq!(bbox.bottom_right, (50, 60));
        assert_eq!(bbox.labels, vec![LabelRef::Key("3".to_string())]);
    }

    #[test]
    fn test_rejects_malformed_metadata() {
        assert!(matches!(
            FrameMessage::from_parts("t", json!([1, 2]), Bytes::new()),
            Err(MetadataError::NotAnObject)
        ));
        assert!(matches!(
            FrameMessage::from_parts("t", json!({"width": 2, "channels": 3}), Bytes::new()),
            Err(MetadataError::Schema(_))
        ));
        let bad_priority = json!({
            "height": 2, "width": 2, "channels": 3,
            "display_info": [{"priority": 9, "info": "?"}],
        });
        assert!(FrameMessage::from_parts("t", bad_priority, Bytes::new()).is_err());
    }
}
