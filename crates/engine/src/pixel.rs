//! Immutable RGBA pixel buffers and their image encodings

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Dimensions, Result, VisregError};

/// Bytes per pixel (R, G, B, A)
pub const CHANNELS: usize = 4;

/// An immutable width x height RGBA8 buffer.
///
/// Pixel storage is shared, so clones are cheap and no stage can observe
/// another stage mutating the same pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes, validating them against the declared dimensions
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VisregError::InvalidBuffer(format!(
                "dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(CHANNELS))
            .ok_or_else(|| {
                VisregError::InvalidBuffer(format!("{}x{} overflows buffer size", width, height))
            })?;

        if pixels.len() != expected {
            return Err(VisregError::InvalidBuffer(format!(
                "{}x{} requires {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    /// A buffer with every pixel set to `color`
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Result<Self> {
        let count = (width as usize) * (height as usize);
        let pixels = color.iter().copied().cycle().take(count * CHANNELS).collect();
        Self::new(width, height, pixels)
    }

    /// Build a new buffer from this one with `f` applied to a copy of the pixels
    pub fn map_pixels(&self, f: impl FnOnce(&mut [u8])) -> Self {
        let mut pixels = self.pixels.to_vec();
        f(&mut pixels);
        Self {
            width: self.width,
            height: self.height,
            pixels: pixels.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Number of pixels (width * height)
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Raw RGBA bytes in row-major order
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Color at (x, y). Panics if the coordinate is outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = self.offset(x, y);
        let mut color = [0u8; 4];
        color.copy_from_slice(&self.pixels[offset..offset + CHANNELS]);
        color
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) out of bounds", x, y);
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    /// SHA-256 over the dimensions and pixel bytes
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(&self.pixels);
        hex::encode(hasher.finalize())
    }

    /// Encode into PNG or JPEG bytes
    pub fn encode(&self, format: &CaptureFormat) -> Result<Vec<u8>> {
        format.validate()?;

        let image = RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec())
            .ok_or_else(|| VisregError::InvalidBuffer("pixel data does not fit image".into()))?;

        let mut out = Cursor::new(Vec::new());
        let result = match format.encoding {
            ImageEncoding::Png => {
                DynamicImage::ImageRgba8(image).write_to(&mut out, ImageOutputFormat::Png)
            }
            ImageEncoding::Jpeg => {
                // JPEG carries no alpha channel
                let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
                DynamicImage::ImageRgb8(rgb).write_to(
                    &mut out,
                    ImageOutputFormat::Jpeg(format.quality.unwrap_or(DEFAULT_JPEG_QUALITY)),
                )
            }
        };

        result.map_err(|source| VisregError::Codec {
            context: format!("encode {}", format.encoding.extension()),
            source,
        })?;

        Ok(out.into_inner())
    }

    /// Decode PNG/JPEG (or any format the image crate detects) into RGBA
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).map_err(|source| VisregError::Codec {
            context: "decode".to_string(),
            source,
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }
}

const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Image encoding requested from a capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    #[default]
    Png,
    Jpeg,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "png",
            ImageEncoding::Jpeg => "jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "png",
            ImageEncoding::Jpeg => "jpg",
        }
    }
}

impl std::str::FromStr for ImageEncoding {
    type Err = VisregError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageEncoding::Png),
            "jpeg" | "jpg" => Ok(ImageEncoding::Jpeg),
            other => Err(VisregError::InvalidRequest(format!(
                "unsupported image encoding: {}",
                other
            ))),
        }
    }
}

/// Encoding and optional quality for a capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub encoding: ImageEncoding,
    #[serde(default)]
    pub quality: Option<u8>,
}

impl CaptureFormat {
    pub fn png() -> Self {
        Self::default()
    }

    pub fn jpeg(quality: u8) -> Self {
        Self {
            encoding: ImageEncoding::Jpeg,
            quality: Some(quality),
        }
    }

    /// Quality applies to JPEG only and must be within 0..=100
    pub fn validate(&self) -> Result<()> {
        match (self.encoding, self.quality) {
            (ImageEncoding::Png, Some(_)) => Err(VisregError::InvalidRequest(
                "quality is only supported for jpeg".into(),
            )),
            (_, Some(q)) if q > 100 => Err(VisregError::InvalidRequest(format!(
                "jpeg quality must be 0-100, got {}",
                q
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_length_mismatch() {
        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, VisregError::InvalidBuffer(_)));
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        assert!(PixelBuffer::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn test_pixel_lookup_is_row_major() {
        let buffer = PixelBuffer::filled(3, 2, [255, 255, 255, 255])
            .unwrap()
            .map_pixels(|p| {
                let offset = (1 * 3 + 2) * CHANNELS;
                p[offset..offset + 4].copy_from_slice(&[1, 2, 3, 4]);
            });

        assert_eq!(buffer.pixel(2, 1), [1, 2, 3, 4]);
        assert_eq!(buffer.pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_map_pixels_leaves_original_untouched() {
        let original = PixelBuffer::filled(2, 2, [0, 0, 0, 255]).unwrap();
        let changed = original.map_pixels(|p| p[0] = 200);

        assert_eq!(original.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(changed.pixel(0, 0), [200, 0, 0, 255]);
        assert_ne!(original.digest(), changed.digest());
    }

    #[test]
    fn test_png_preserves_pixels() {
        let buffer = PixelBuffer::filled(4, 3, [10, 20, 30, 128]).unwrap();
        let png = buffer.encode(&CaptureFormat::png()).unwrap();
        let decoded = PixelBuffer::decode(&png).unwrap();
        assert_eq!(decoded, buffer);
    }

    #[test]
    fn test_jpeg_output_is_opaque() {
        let buffer = PixelBuffer::filled(8, 8, [200, 100, 50, 40]).unwrap();
        let jpeg = buffer.encode(&CaptureFormat::jpeg(90)).unwrap();
        let decoded = PixelBuffer::decode(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), buffer.dimensions());
        assert_eq!(decoded.pixel(4, 4)[3], 255);
    }

    #[test]
    fn test_format_validation() {
        assert!(CaptureFormat::jpeg(101).validate().is_err());
        assert!(CaptureFormat {
            encoding: ImageEncoding::Png,
            quality: Some(50)
        }
        .validate()
        .is_err());
        assert_eq!("JPG".parse::<ImageEncoding>().unwrap(), ImageEncoding::Jpeg);
    }
}
