//! Frame annotation
//!
//! - `engine` - box, label, border, metric and note drawing
//! - `labels` - per-topic label key resolution
//! - `text` - font loading and glyph rasterization

pub mod engine;
pub mod labels;
pub mod text;

pub use engine::{is_throughput_key, AnnotatedFrame, AnnotationEngine, DrawConfig};
pub use labels::{LabelMap, ResolvedLabel};
pub use text::{FontError, TextOverlay, Typeface};
