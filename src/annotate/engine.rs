//! Annotation engine
//!
//! Draws detection results onto a decoded frame. Drawing happens in a fixed
//! order, later steps layering over earlier ones:
//!
//! 1. box outlines
//! 2. box labels
//! 3. status border (grows the frame)
//! 4. throughput metrics
//! 5. display notes

use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::labels::LabelMap;
use super::text::{TextOverlay, Typeface};
use crate::frame::{Annotations, BoundingBox, LabelPlacement, Priority};
use crate::utils::LogThrottler;

const LOW_PRIORITY_COLOR: [u8; 3] = [0, 255, 0];
const MEDIUM_PRIORITY_COLOR: [u8; 3] = [170, 150, 0];
const HIGH_PRIORITY_COLOR: [u8; 3] = [255, 0, 0];

const METRIC_X: i32 = 10;
const METRIC_TOP: i32 = 10;
const METRIC_PITCH: i32 = 12;
const NOTE_X: i32 = 20;
const NOTE_PITCH: i32 = 10;

/// Drawing parameters, shared by every topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Border color of frames without findings (RGB)
    pub good_color: [u8; 3],
    /// Border and box color of frames with findings (RGB)
    pub bad_color: [u8; 3],
    /// Color of metric lines
    pub metric_color: [u8; 3],
    /// Border width in pixels on each side
    pub border_width: u32,
    /// Box outline thickness in pixels
    pub box_thickness: u32,
    /// Vertical distance between stacked labels
    pub label_pitch: i32,
    /// Label glyph height in pixels
    pub label_scale: f32,
    /// Metric and note glyph height in pixels
    pub text_scale: f32,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            good_color: [0, 255, 0],
            bad_color: [255, 0, 0],
            metric_color: [255, 255, 255],
            border_width: 5,
            box_thickness: 2,
            label_pitch: 10,
            label_scale: 10.0,
            text_scale: 11.0,
        }
    }
}

/// A frame with its overlays applied
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    /// Text placed on the frame, in output coordinates
    pub overlays: Vec<TextOverlay>,
    /// Border color, if a border was added
    pub border: Option<[u8; 3]>,
    /// Number of detections drawn
    pub detections: usize,
}

impl AnnotatedFrame {
    /// Frame passed through without annotation
    pub fn plain(image: RgbImage) -> Self {
        Self {
            image,
            overlays: Vec::new(),
            border: None,
            detections: 0,
        }
    }
}

/// Renders annotations onto frames
///
/// Stateless apart from the warning throttler, so one engine is shared by
/// every worker.
pub struct AnnotationEngine {
    config: DrawConfig,
    typeface: Typeface,
    warnings: LogThrottler,
}

impl AnnotationEngine {
    pub fn new(config: DrawConfig, typeface: Typeface) -> Self {
        Self {
            config,
            typeface,
            warnings: LogThrottler::default(),
        }
    }

    /// Draw `annotations` onto `image`
    pub fn annotate(
        &self,
        topic: &str,
        mut image: RgbImage,
        annotations: &Annotations,
        labels: &LabelMap,
    ) -> AnnotatedFrame {
        let boxes: Vec<BoundingBox> = annotations
            .detections
            .iter()
            .map(|d| self.clamp_box(topic, d.normalize(), image.width(), image.height()))
            .collect();

        // 1. Box outlines
        for bbox in &boxes {
            self.draw_box(&mut image, bbox);
        }

        // 2. Labels
        let mut overlays = Vec::new();
        for bbox in &boxes {
            self.place_labels(topic, bbox, labels, &mut overlays);
        }
        for overlay in &overlays {
            self.typeface.draw(&mut image, overlay);
        }

        // 3. Border
        let border = if boxes.is_empty() {
            self.config.good_color
        } else {
            self.config.bad_color
        };
        let mut image = self.add_border(&image, border);
        let offset = self.config.border_width as i32;
        for overlay in &mut overlays {
            overlay.offset(offset, offset);
        }

        // 4. Metrics
        let metrics = throughput_metrics(&annotations.extra_metrics);
        for (i, line) in metrics.iter().enumerate() {
            let overlay = TextOverlay {
                text: line.clone(),
                x: METRIC_X,
                y: METRIC_TOP + METRIC_PITCH * i as i32,
                color: self.config.metric_color,
                scale: self.config.text_scale,
            };
            self.typeface.draw(&mut image, &overlay);
            overlays.push(overlay);
        }

        // 5. Display notes, below the metrics block
        let notes_top = METRIC_TOP + METRIC_PITCH * metrics.len() as i32;
        for (i, note) in annotations.display_info.iter().enumerate() {
            let overlay = TextOverlay {
                text: note.text.clone(),
                x: NOTE_X,
                y: notes_top + NOTE_PITCH * (i as i32 + 1),
                color: priority_color(note.priority),
                scale: self.config.text_scale,
            };
            self.typeface.draw(&mut image, &overlay);
            overlays.push(overlay);
        }

        AnnotatedFrame {
            image,
            overlays,
            border: Some(border),
            detections: boxes.len(),
        }
    }

    /// Clamp box corners into the frame
    fn clamp_box(&self, topic: &str, mut bbox: BoundingBox, width: u32, height: u32) -> BoundingBox {
        let max_x = width.saturating_sub(1) as i32;
        let max_y = height.saturating_sub(1) as i32;
        let clamp = |(x, y): (i32, i32)| (x.clamp(0, max_x), y.clamp(0, max_y));

        let top_left = clamp(bbox.top_left);
        let bottom_right = clamp(bbox.bottom_right);
        if (top_left, bottom_right) != (bbox.top_left, bbox.bottom_right)
            && self.warnings.should_log(&format!("clamp:{}", topic))
        {
            warn!(
                "Detection box {:?}-{:?} on topic {} exceeds {}x{} frame, clamped",
                bbox.top_left, bbox.bottom_right, topic, width, height
            );
        }
        bbox.top_left = top_left;
        bbox.bottom_right = bottom_right;
        bbox
    }

    fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox) {
        let (x1, y1) = bbox.top_left;
        let (x2, y2) = bbox.bottom_right;
        let color = Rgb(self.config.bad_color);

        for t in 0..self.config.box_thickness as i32 {
            let w = x2 - x1 + 1 - 2 * t;
            let h = y2 - y1 + 1 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(image, Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32), color);
        }
    }

    fn place_labels(
        &self,
        topic: &str,
        bbox: &BoundingBox,
        labels: &LabelMap,
        overlays: &mut Vec<TextOverlay>,
    ) {
        let pitch = self.config.label_pitch;
        let (x1, y1) = bbox.top_left;
        let (_, y2) = bbox.bottom_right;

        let count = match bbox.placement {
            LabelPlacement::AboveTopLeft => bbox.labels.len(),
            LabelPlacement::BelowBox => bbox.labels.len().min(1),
        };

        for (i, label) in bbox.labels.iter().take(count).enumerate() {
            let resolved = labels.resolve(label);
            // Keyed per topic: label keys come from the publisher
            if !resolved.resolved && self.warnings.should_log(&format!("label:{}", topic)) {
                warn!(
                    "No label mapping for '{}' on topic {}, drawing the raw key",
                    resolved.text, topic
                );
            }

            let y = match bbox.placement {
                LabelPlacement::AboveTopLeft => y1 - pitch * (i as i32 + 1),
                LabelPlacement::BelowBox => y2 + pitch,
            };
            overlays.push(TextOverlay {
                text: resolved.text.into_owned(),
                x: x1,
                y: y.max(0),
                color: self.config.bad_color,
                scale: self.config.label_scale,
            });
        }
    }

    fn add_border(&self, image: &RgbImage, color: [u8; 3]) -> RgbImage {
        let b = self.config.border_width;
        let mut bordered =
            RgbImage::from_pixel(image.width() + 2 * b, image.height() + 2 * b, Rgb(color));
        imageops::replace(&mut bordered, image, b as i64, b as i64);
        bordered
    }
}

fn priority_color(priority: Priority) -> [u8; 3] {
    match priority {
        Priority::Low => LOW_PRIORITY_COLOR,
        Priority::Medium => MEDIUM_PRIORITY_COLOR,
        Priority::High => HIGH_PRIORITY_COLOR,
    }
}

/// Whether a metadata key names a rate or frequency counter
pub fn is_throughput_key(key: &str) -> bool {
    key.to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| {
            token.ends_with("fps")
                || matches!(token, "rate" | "throughput" | "frequency" | "hz")
        })
}

/// `key: value` lines for the throughput entries of `metrics`
fn throughput_metrics(metrics: &Map<String, Value>) -> Vec<String> {
    metrics
        .iter()
        .filter(|(key, _)| is_throughput_key(key))
        .filter_map(|(key, value)| match value {
            Value::Number(n) => Some(format!("{}: {}", key, n)),
            Value::String(s) => Some(format!("{}: {}", key, s)),
            _ => None,
        })
        .collect()
}
