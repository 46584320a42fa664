//! Header-only probing for layout queries.
//!
//! The probe loads a file, checks the JPEG start-of-image signature and
//! parses just enough of the header to report dimensions. Pixel data is
//! never decoded.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::ImageDecoder;

use super::loader::load_file;
use super::DecodeError;
use crate::config::DecoderConfig;
use crate::fs::FileSystem;

/// SOI marker (`FF D8`) followed by the high byte of the next marker.
pub const JPEG_SIGNATURE: u32 = 0x00FF_D8FF;

/// Check the low three bytes of a little-endian read of the first four file bytes.
#[inline]
pub fn is_jpeg_signature(word: u32) -> bool {
    word & 0x00FF_FFFF == JPEG_SIGNATURE
}

/// The first four bytes of `bytes` as a little-endian word.
#[inline]
pub fn signature_word(bytes: &[u8]) -> Option<u32> {
    let head: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(head))
}

/// Load `path` and return its pixel dimensions without decoding it.
///
/// A signature mismatch is only logged when the file's extension claims to
/// be JPEG; other files are expected to fail here and do so quietly.
///
/// # Errors
///
/// - Loader errors (`NotFound`, `IoError`, `ShortRead`, `OutOfMemory`)
/// - `DecodeError::InvalidFormat` on a signature mismatch or malformed header
pub fn probe_jpeg_size(
    fs: &dyn FileSystem,
    path: &str,
    config: &DecoderConfig,
) -> Result<(u32, u32), DecodeError> {
    let data = load_file(fs, path)?;

    match signature_word(&data) {
        Some(word) if is_jpeg_signature(word) => {}
        word => {
            if config.claims_jpeg(path) {
                tracing::warn!(
                    path,
                    signature = %format!("{:#X}", word.unwrap_or(0)),
                    "signature error"
                );
            }
            return Err(DecodeError::InvalidFormat);
        }
    }

    read_jpeg_size(&data)
}

/// Parse the JPEG header in `bytes` and return `(width, height)`.
pub fn read_jpeg_size(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let decoder = JpegDecoder::new(Cursor::new(bytes)).map_err(|err| {
        tracing::warn!(error = %err, "read jpeg head failed");
        DecodeError::InvalidFormat
    })?;
    Ok(decoder.dimensions())
}
