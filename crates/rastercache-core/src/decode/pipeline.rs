//! Full JPEG decode into a packed blue-green-red raster.
//!
//! The pipeline runs in fixed steps: bind the decompressor to the input
//! buffer, parse the header, check the frame against the limits, allocate
//! the output raster, decompress into it, put each scanline into output
//! component order, then finish. Every step returns a `Result`; the first
//! failure aborts the [`DecodeSession`], which is the single place the
//! partial output and decompressor state are released.
//!
//! Decompression is strict. Entropy data that runs out early, stray markers
//! inside a scan, and a missing end-of-image marker all fail the decode
//! instead of producing a padded guess.
//!
//! The frame is decompressed straight into the output raster, so peak memory
//! is one raster plus the input buffer.

use zune_jpeg::zune_core::bytestream::ZCursor;
use zune_jpeg::JpegDecoder;

use super::loader::load_file;
use super::{DecodeError, DecodedRaster, ImageHeader, JPEG_PIXEL_SIZE};
use crate::config::DecodeLimits;
use crate::fs::FileSystem;

/// Source channel for each output byte of a pixel: blue, green, red.
const OUTPUT_COMPONENT_ORDER: [usize; JPEG_PIXEL_SIZE] = [2, 1, 0];

const MARKER_PREFIX: u8 = 0xFF;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

/// Load `path` and decode it.
pub fn decode_jpeg_file(
    fs: &dyn FileSystem,
    path: &str,
    limits: &DecodeLimits,
) -> Result<DecodedRaster, DecodeError> {
    let data = load_file(fs, path).inspect_err(|_| {
        tracing::warn!(path, "can't load file");
    })?;
    decode_jpeg_buffer(data, limits)
}

/// Decode a whole in-memory JPEG into a packed raster.
///
/// The input buffer is consumed and freed before returning, on success and
/// on failure alike.
///
/// # Errors
///
/// - `DecodeError::Decode` for any corrupt, truncated or unsupported stream
/// - `DecodeError::OutOfMemory` if the output can't be allocated or a limit is hit
pub fn decode_jpeg_buffer(
    input: Vec<u8>,
    limits: &DecodeLimits,
) -> Result<DecodedRaster, DecodeError> {
    let result = {
        let mut session = DecodeSession::default();
        match session.run(&input, limits) {
            Ok(raster) => Ok(raster),
            Err(err) => {
                tracing::warn!(error = %err, "decoding error");
                session.abort();
                Err(err)
            }
        }
    };
    drop(input);
    result
}

/// Everything a decode allocates after it starts.
#[derive(Default)]
struct DecodeSession<'a> {
    decompressor: Option<Decompressor<'a>>,
    output: Option<Vec<u8>>,
}

impl<'a> DecodeSession<'a> {
    fn run(
        &mut self,
        input: &'a [u8],
        limits: &DecodeLimits,
    ) -> Result<DecodedRaster, DecodeError> {
        let decompressor = self
            .decompressor
            .insert(Decompressor::new(input, limits)?);

        let header = ImageHeader::new(decompressor.output_width(), decompressor.output_height());
        let size = header.byte_size().ok_or(DecodeError::OutOfMemory)?;
        if size == 0 {
            return Err(DecodeError::Decode("empty frame".to_string()));
        }
        if !limits.allows(header.width, header.height, size) {
            tracing::warn!(
                width = header.width,
                height = header.height,
                bytes = size,
                "frame exceeds decode limits"
            );
            return Err(DecodeError::OutOfMemory);
        }

        let output = self.output.insert(allocate(size)?);
        output.resize(size, 0);
        decompressor.start(output)?;

        for row in output.chunks_exact_mut(header.stride()) {
            decompressor.convert_scanline(row)?;
        }

        if let Some(decompressor) = self.decompressor.take() {
            decompressor.finish()?;
        }

        let pixels = self.output.take().ok_or(DecodeError::OutOfMemory)?;
        Ok(DecodedRaster::new(header, pixels))
    }

    /// Release the partial output, then the decompressor state.
    fn abort(self) {
        let DecodeSession {
            decompressor,
            output,
        } = self;
        if let Some(output) = output {
            tracing::trace!(bytes = output.capacity(), "freeing partial output");
            drop(output);
        }
        drop(decompressor);
    }
}

fn allocate(size: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(size).map_err(|_| {
        tracing::warn!(bytes = size, "allocation failed for output raster");
        DecodeError::OutOfMemory
    })?;
    Ok(buffer)
}

/// One strict JPEG decode over an in-memory stream.
///
/// `start` decompresses the frame as RGB into the caller's raster; callers
/// then hand every row back through `convert_scanline`, in order, until
/// `output_scanline` reaches `output_height`.
struct Decompressor<'a> {
    decoder: JpegDecoder<ZCursor<&'a [u8]>>,
    input: &'a [u8],
    started: bool,
    output_width: u32,
    output_height: u32,
    output_scanline: u32,
}

impl<'a> Decompressor<'a> {
    /// Bind to `input` and parse the header.
    ///
    /// Tables-only and malformed headers are rejected here.
    fn new(input: &'a [u8], limits: &DecodeLimits) -> Result<Self, DecodeError> {
        let mut decoder =
            JpegDecoder::new_with_options(ZCursor::new(input), limits.to_decoder_options());
        decoder.decode_headers()?;
        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| DecodeError::Decode("no frame header".to_string()))?;

        Ok(Self {
            decoder,
            input,
            started: false,
            output_width: u32::try_from(width).map_err(|_| DecodeError::OutOfMemory)?,
            output_height: u32::try_from(height).map_err(|_| DecodeError::OutOfMemory)?,
            output_scanline: 0,
        })
    }

    /// Decompress the whole frame into `output`, which must be exactly
    /// `output_height` packed rows.
    fn start(&mut self, output: &mut [u8]) -> Result<(), DecodeError> {
        if self.started {
            return Err(DecodeError::Decode("decompression already started".to_string()));
        }
        let expected = self.row_stride() * self.output_height as usize;
        if output.len() != expected {
            return Err(DecodeError::Decode(format!(
                "output holds {} bytes, frame needs {expected}",
                output.len()
            )));
        }

        self.decoder.decode_into(output)?;
        self.started = true;
        Ok(())
    }

    fn output_width(&self) -> u32 {
        self.output_width
    }

    fn output_height(&self) -> u32 {
        self.output_height
    }

    fn row_stride(&self) -> usize {
        self.output_width as usize * JPEG_PIXEL_SIZE
    }

    /// Put the next decompressed scanline into output component order.
    fn convert_scanline(&mut self, row: &mut [u8]) -> Result<(), DecodeError> {
        if !self.started {
            return Err(DecodeError::Decode("decompression not started".to_string()));
        }
        if self.output_scanline >= self.output_height {
            return Err(DecodeError::Decode("read past the last scanline".to_string()));
        }
        if row.len() != self.row_stride() {
            return Err(DecodeError::Decode("scanline length mismatch".to_string()));
        }

        for px in row.chunks_exact_mut(JPEG_PIXEL_SIZE) {
            let rgb = [px[0], px[1], px[2]];
            for (out, &channel) in px.iter_mut().zip(OUTPUT_COMPONENT_ORDER.iter()) {
                *out = rgb[channel];
            }
        }

        self.output_scanline += 1;
        Ok(())
    }

    /// Check that every scanline was consumed and that the stream ends
    /// with its end-of-image marker.
    fn finish(self) -> Result<(), DecodeError> {
        if self.output_scanline != self.output_height {
            return Err(DecodeError::Decode(format!(
                "decompression finished after {} of {} scanlines",
                self.output_scanline, self.output_height
            )));
        }
        if !reaches_end_of_image(self.input) {
            return Err(DecodeError::Decode(
                "stream ended without an end-of-image marker".to_string(),
            ));
        }
        Ok(())
    }
}

/// Walk the marker structure of `data` and report whether an end-of-image
/// marker follows at least one complete scan.
///
/// Inside entropy-coded data only stuffed bytes (`FF 00`), fill bytes and
/// restart markers may follow `FF`; any other marker ends the scan and must
/// be a well-formed segment.
fn reaches_end_of_image(data: &[u8]) -> bool {
    if data.get(..2) != Some(&[MARKER_PREFIX, 0xD8][..]) {
        return false;
    }

    let mut pos = 2;
    let mut seen_scan = false;
    loop {
        // Marker segment at `pos`
        if data.get(pos) != Some(&MARKER_PREFIX) {
            return false;
        }
        while data.get(pos + 1) == Some(&MARKER_PREFIX) {
            pos += 1;
        }
        let Some(&code) = data.get(pos + 1) else {
            return false;
        };
        match code {
            EOI => return seen_scan,
            0x00 | 0x01 | 0xD0..=0xD8 => return false,
            _ => {}
        }
        let Some(len) = data
            .get(pos + 2..pos + 4)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]])))
        else {
            return false;
        };
        if len < 2 || pos + 2 + len > data.len() {
            return false;
        }
        pos += 2 + len;
        if code != SOS {
            continue;
        }

        // Entropy-coded data up to the next real marker
        seen_scan = true;
        loop {
            let Some(offset) = data[pos..].iter().position(|&b| b == MARKER_PREFIX) else {
                return false;
            };
            pos += offset;
            match data.get(pos + 1) {
                None => return false,
                Some(0x00) | Some(0xD0..=0xD7) => pos += 2,
                Some(&MARKER_PREFIX) => pos += 1,
                Some(_) => break,
            }
        }
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
