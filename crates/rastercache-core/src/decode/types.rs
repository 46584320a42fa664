//! Core types for image decoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zune_jpeg::errors::DecodeErrors;

use crate::fs::FsError;

/// Bytes per pixel of every raster this crate produces.
pub const JPEG_PIXEL_SIZE: usize = 3;

/// Error types for loading and decoding operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The source file could not be opened.
    #[error("File not found: {0}")]
    NotFound(String),

    /// Seek, tell or read failed in the filesystem layer.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Fewer bytes were read than the file claimed to hold.
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// A buffer allocation failed or a decode limit was exceeded.
    #[error("Out of memory during decoding")]
    OutOfMemory,

    /// The signature or header is not a JPEG.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The decoder hit corrupt or unsupported data mid-stream.
    #[error("JPEG decoding failed: {0}")]
    Decode(String),
}

impl DecodeError {
    /// Map a filesystem failure for `path` onto the decode taxonomy.
    pub fn from_fs(err: FsError, path: &str) -> Self {
        match err {
            FsError::NotFound => DecodeError::NotFound(path.to_string()),
            other => DecodeError::IoError(other.to_string()),
        }
    }
}

impl From<DecodeErrors> for DecodeError {
    fn from(err: DecodeErrors) -> Self {
        match err {
            DecodeErrors::LargeDimensions(_) => DecodeError::OutOfMemory,
            other => DecodeError::Decode(other.to_string()),
        }
    }
}

/// Pixel format of a decoded raster.
///
/// `Rgb888` is stored blue, green, red in memory, matching the
/// packed 24-bit format display hosts expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorFormat {
    #[default]
    Rgb888,
}

impl ColorFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorFormat::Rgb888 => JPEG_PIXEL_SIZE,
        }
    }
}

/// Result of a header probe: format and dimensions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub cf: ColorFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageHeader {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            cf: ColorFormat::Rgb888,
            width,
            height,
        }
    }

    /// Bytes per row, without padding.
    pub fn stride(&self) -> usize {
        self.width as usize * self.cf.bytes_per_pixel()
    }

    /// Total raster size in bytes, or `None` if it overflows `usize`.
    pub fn byte_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.cf.bytes_per_pixel())?
            .checked_mul(self.height as usize)
    }
}

/// A fully decoded, packed raster.
///
/// Rows are stored top to bottom with no padding; each pixel is three bytes
/// in blue, green, red order.
#[derive(Debug)]
pub struct DecodedRaster {
    header: ImageHeader,
    pixels: Box<[u8]>,
}

impl DecodedRaster {
    pub fn new(header: ImageHeader, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            Some(pixels.len()),
            header.byte_size(),
            "Pixel buffer size mismatch"
        );
        Self {
            header,
            pixels: pixels.into_boxed_slice(),
        }
    }

    pub fn header(&self) -> ImageHeader {
        self.header
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// A single row of packed pixels, or `None` past the last row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.header.height {
            return None;
        }
        let stride = self.header.stride();
        let start = y as usize * stride;
        self.pixels.get(start..start + stride)
    }

    /// Get the size of the pixel buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.width == 0 || self.header.height == 0 || self.pixels.is_empty()
    }
}
