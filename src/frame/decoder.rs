//! Frame decoder
//!
//! Turns a bus blob into an RGB pixel matrix. Raw blobs are reshaped from a
//! flat row-major buffer; encoded blobs go through the `image` codecs.

use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::message::{Encoding, FrameHeader};

/// Frame decode error
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("buffer length {actual} does not match {width}x{height}x{channels} = {expected}")]
    ShapeMismatch {
        width: u32,
        height: u32,
        channels: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame has no pixels ({width}x{height}x{channels})")]
    EmptyFrame { width: u32, height: u32, channels: u32 },

    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u32),

    #[error("codec error ({kind}): {source}")]
    Codec {
        kind: String,
        #[source]
        source: image::ImageError,
    },
}

/// Byte order of the color channels in raw buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// OpenCV-style blue, green, red
    #[default]
    Bgr,
    Rgb,
}

/// Decodes bus blobs into RGB images
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    order: ChannelOrder,
}

impl FrameDecoder {
    pub fn new(order: ChannelOrder) -> Self {
        Self { order }
    }

    /// Decode a blob described by `header`
    pub fn decode_frame(&self, header: &FrameHeader, raw: &[u8]) -> Result<RgbImage, DecodeError> {
        self.decode(
            raw,
            header.width,
            header.height,
            header.channels,
            header.encoding.as_ref(),
        )
    }

    /// Decode `raw` into a `width` x `height` RGB image
    ///
    /// With an `encoding` the blob describes its own dimensions and the shape
    /// arguments are ignored.
    pub fn decode(
        &self,
        raw: &[u8],
        width: u32,
        height: u32,
        channels: u32,
        encoding: Option<&Encoding>,
    ) -> Result<RgbImage, DecodeError> {
        match encoding {
            Some(encoding) => decode_compressed(raw, encoding),
            None => self.reshape(raw, width, height, channels),
        }
    }

    fn reshape(
        &self,
        raw: &[u8],
        width: u32,
        height: u32,
        channels: u32,
    ) -> Result<RgbImage, DecodeError> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(DecodeError::EmptyFrame {
                width,
                height,
                channels,
            });
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .unwrap_or(usize::MAX);
        if raw.len() != expected {
            return Err(DecodeError::ShapeMismatch {
                width,
                height,
                channels,
                expected,
                actual: raw.len(),
            });
        }

        let swap = self.order == ChannelOrder::Bgr;
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        match channels {
            1 => {
                for &v in raw {
                    data.extend_from_slice(&[v, v, v]);
                }
            }
            3 | 4 => {
                for px in raw.chunks_exact(channels as usize) {
                    if swap {
                        data.extend_from_slice(&[px[2], px[1], px[0]]);
                    } else {
                        data.extend_from_slice(&px[..3]);
                    }
                }
            }
            other => return Err(DecodeError::UnsupportedChannels(other)),
        }

        // Length was checked above, so the buffer always fits
        RgbImage::from_raw(width, height, data).ok_or(DecodeError::ShapeMismatch {
            width,
            height,
            channels,
            expected,
            actual: raw.len(),
        })
    }
}

fn decode_compressed(raw: &[u8], encoding: &Encoding) -> Result<RgbImage, DecodeError> {
    let format = match encoding.kind.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        _ => None,
    };

    let decoded = match format {
        Some(format) => image::load_from_memory_with_format(raw, format),
        None => image::load_from_memory(raw),
    }
    .map_err(|source| DecodeError::Codec {
        kind: encoding.kind.clone(),
        source,
    })?;

    Ok(decoded.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::Rgb;

    fn jpeg_encoding() -> Encoding {
        Encoding {
            kind: "jpeg".to_string(),
            level: Some(90),
        }
    }

    #[test]
    fn test_reshape_matches_shape() {
        let decoder = FrameDecoder::new(ChannelOrder::Rgb);
        for (w, h) in [(1, 1), (4, 3), (640, 480)] {
            let raw = vec![7u8; (w * h * 3) as usize];
            let img = decoder.decode(&raw, w, h, 3, None).unwrap();
            assert_eq!(img.dimensions(), (w, h));
        }
    }

    #[test]
    fn test_reshape_is_row_major() {
        let decoder = FrameDecoder::new(ChannelOrder::Rgb);
        // 2x2, pixel (1, 0) is red and (0, 1) is blue
        let raw = [0, 0, 0, 255, 0, 0, 0, 0, 255, 0, 0, 0];
        let img = decoder.decode(&raw, 2, 2, 3, None).unwrap();
        assert_eq!(*img.get_pixel(1, 0), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(0, 1), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_bgr_is_swapped() {
        let decoder = FrameDecoder::default();
        let img = decoder.decode(&[10, 20, 30], 1, 1, 3, None).unwrap();
        assert_eq!(*img.get_pixel(0, 0), Rgb([30, 20, 10]));
    }

    #[test]
    fn test_gray_and_alpha_channels() {
        let decoder = FrameDecoder::new(ChannelOrder::Rgb);
        let gray = decoder.decode(&[42, 43], 2, 1, 1, None).unwrap();
        assert_eq!(*gray.get_pixel(1, 0), Rgb([43, 43, 43]));

        let rgba = decoder.decode(&[1, 2, 3, 255], 1, 1, 4, None).unwrap();
        assert_eq!(*rgba.get_pixel(0, 0), Rgb([1, 2, 3]));
    }

    #[test]
    fn test_shape_mismatch() {
        let decoder = FrameDecoder::default();
        let err = decoder.decode(&[0u8; 10], 2, 2, 3, None).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::ShapeMismatch {
                expected: 12,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_empty_and_odd_channels() {
        let decoder = FrameDecoder::default();
        assert!(matches!(
            decoder.decode(&[], 0, 4, 3, None),
            Err(DecodeError::EmptyFrame { .. })
        ));
        assert!(matches!(
            decoder.decode(&[0u8; 8], 2, 2, 2, None),
            Err(DecodeError::UnsupportedChannels(2))
        ));
    }

    #[test]
    fn test_decode_jpeg_blob() {
        let source = RgbImage::from_pixel(32, 16, Rgb([200, 40, 40]));
        let mut blob = Vec::new();
        JpegEncoder::new_with_quality(&mut blob, 90)
            .encode_image(&source)
            .unwrap();

        // Shape arguments are ignored for encoded blobs
        let img = FrameDecoder::default()
            .decode(&blob, 1, 1, 1, Some(&jpeg_encoding()))
            .unwrap();
        assert_eq!(img.dimensions(), (32, 16));
    }

    #[test]
    fn test_malformed_jpeg_is_codec_error() {
        let err = FrameDecoder::default()
            .decode(b"definitely not a jpeg", 1, 1, 3, Some(&jpeg_encoding()))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Codec { .. }));
    }
}
