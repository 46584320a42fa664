//! RasterCache Core - on-demand JPEG decoding with a shared raster cache
//!
//! This crate decodes JPEG files into packed 24-bit rasters and keeps the
//! results in a size-bounded, lease-counted cache shared by every decoder
//! attached to it. A host drives it through the [`DecoderPlugin`] trait.

pub mod cache;
pub mod config;
pub mod decode;
pub mod decoder;
pub mod fs;
pub mod source;

pub use cache::{CacheStore, RasterCache, RasterView};
pub use config::{CacheConfig, ConfigError, DecodeLimits, DecoderConfig};
pub use decode::{ColorFormat, DecodeError, DecodedRaster, ImageHeader};
pub use decoder::{DecoderPlugin, DecoderStats, Invalid, JpegDecoder, StatsSnapshot};
pub use fs::{FileSystem, FsError, MemoryFileSystem, StdFileSystem};
pub use source::ImageSource;
