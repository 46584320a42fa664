//! JPEG loading, probing and decoding.
//!
//! This module provides functionality for:
//! - Loading a whole file into one owned buffer
//! - Probing a JPEG header for its dimensions without decoding pixels
//! - Decoding a JPEG into a packed 3-bytes-per-pixel raster, row by row
//!
//! # Architecture
//!
//! All operations are synchronous. Each stage frees what it allocated on
//! every exit path; failures surface as a single [`DecodeError`].
//!
//! # Examples
//!
//! ```ignore
//! use rastercache_core::config::DecodeLimits;
//! use rastercache_core::decode::decode_jpeg_buffer;
//!
//! let jpeg_bytes = std::fs::read("photo.jpg").unwrap();
//! let raster = decode_jpeg_buffer(jpeg_bytes, &DecodeLimits::default()).unwrap();
//! println!("Decoded {}x{} image", raster.width(), raster.height());
//! ```

mod loader;
mod pipeline;
mod probe;
mod types;

pub use loader::load_file;
pub use pipeline::{decode_jpeg_buffer, decode_jpeg_file};
pub use probe::{is_jpeg_signature, probe_jpeg_size, read_jpeg_size, signature_word, JPEG_SIGNATURE};
pub use types::{ColorFormat, DecodeError, DecodedRaster, ImageHeader, JPEG_PIXEL_SIZE};
