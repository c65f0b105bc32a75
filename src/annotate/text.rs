//! Text rendering
//!
//! Glyphs are rasterized with `ab_glyph` through `imageproc`. DejaVu Sans is
//! compiled in; a configured font file replaces it.

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Font compiled into the binary
const BUILTIN_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Font loading error
#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid font data in {0}")]
    Invalid(String),
}

/// A line of text placed on a frame
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    /// Left edge, in output-frame pixels
    pub x: i32,
    /// Top edge, in output-frame pixels
    pub y: i32,
    pub color: [u8; 3],
    pub scale: f32,
}

impl TextOverlay {
    /// Move by `(dx, dy)`
    pub fn offset(&mut self, dx: i32, dy: i32) {
        self.x += dx;
        self.y += dy;
    }
}

/// Font used for every text overlay
#[derive(Clone)]
pub struct Typeface {
    name: String,
    font: FontArc,
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Typeface").field("name", &self.name).finish()
    }
}

impl Typeface {
    /// The compiled-in DejaVu Sans
    pub fn builtin() -> Result<Self, FontError> {
        let font = FontArc::try_from_slice(BUILTIN_FONT)
            .map_err(|_| FontError::Invalid("builtin".to_string()))?;
        Ok(Self {
            name: "DejaVu Sans".to_string(),
            font,
        })
    }

    /// Load a TrueType/OpenType font file
    pub fn load(path: &Path) -> Result<Self, FontError> {
        let data = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(data, &path.display().to_string())
    }

    /// Build from in-memory font data; `name` is only used in errors
    pub fn from_bytes(data: Vec<u8>, name: &str) -> Result<Self, FontError> {
        let font = FontArc::try_from_vec(data).map_err(|_| FontError::Invalid(name.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            font,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rasterize an overlay onto `image`; glyphs outside the image are clipped
    pub fn draw(&self, image: &mut RgbImage, overlay: &TextOverlay) {
        draw_text_mut(
            image,
            Rgb(overlay.color),
            overlay.x,
            overlay.y,
            PxScale::from(overlay.scale),
            &self.font,
            &overlay.text,
        );
    }
}
