//! Decoder and cache configuration.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! jpeg_extensions = ["jpg", "jpeg"]
//!
//! [cache]
//! max_size = 8388608
//!
//! [limits]
//! max_width = 4096
//! max_height = 4096
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zune_jpeg::zune_core::colorspace::ColorSpace;
use zune_jpeg::zune_core::options::DecoderOptions;

use crate::fs::extension;

/// Default cache capacity: 8 MiB of decoded raster data.
pub const DEFAULT_CACHE_SIZE: usize = 8 * 1024 * 1024;

/// Default allocation ceiling for a single decode, mirroring the `image` crate.
pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub cache: CacheConfig,
    pub limits: DecodeLimits,
    /// Extensions that claim a file is JPEG. A signature mismatch on one of
    /// these is logged; on anything else it is silently skipped.
    pub jpeg_extensions: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            limits: DecodeLimits::default(),
            jpeg_extensions: vec!["jpg".to_string(), "jpeg".to_string()],
        }
    }
}

impl DecoderConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Whether the extension of `path` says the file should be a JPEG.
    ///
    /// Compared case-sensitively.
    pub fn claims_jpeg(&self, path: &str) -> bool {
        let ext = extension(path);
        self.jpeg_extensions.iter().any(|candidate| candidate == ext)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of the cache store in bytes.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_SIZE,
        }
    }
}

/// Limits applied to each full decode. Exceeding one is reported as
/// [`DecodeError::OutOfMemory`](crate::decode::DecodeError::OutOfMemory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub max_alloc: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_alloc: Some(DEFAULT_MAX_ALLOC),
        }
    }
}

impl DecodeLimits {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_alloc: None,
        }
    }

    /// Whether a `width` x `height` frame needing `bytes` of output fits.
    pub fn allows(&self, width: u32, height: u32, bytes: usize) -> bool {
        self.max_width.map_or(true, |max| width <= max)
            && self.max_height.map_or(true, |max| height <= max)
            && self.max_alloc.map_or(true, |max| bytes as u64 <= max)
    }

    /// Options for a strict full decode into packed RGB.
    ///
    /// The decoder's own size caps are lifted; [`allows`](Self::allows) is
    /// checked against the parsed header instead.
    pub fn to_decoder_options(&self) -> DecoderOptions {
        let frame_cap = usize::from(u16::MAX);
        DecoderOptions::default()
            .set_strict_mode(true)
            .jpeg_set_out_colorspace(ColorSpace::RGB)
            .set_max_width(frame_cap)
            .set_max_height(frame_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = DecoderConfig::from_toml_str("").unwrap();
        assert_eq!(config, DecoderConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = DecoderConfig::from_toml_str(
            r#"
            jpeg_extensions = ["jpg", "jpe"]

            [cache]
            max_size = 1024

            [limits]
            max_width = 640
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.max_size, 1024);
        assert_eq!(config.limits.max_width, Some(640));
        assert_eq!(config.limits.max_height, None);
        assert_eq!(config.limits.max_alloc, Some(DEFAULT_MAX_ALLOC));
        assert!(config.claims_jpeg("photo.jpe"));
        assert!(!config.claims_jpeg("photo.jpeg"));
    }

    #[test]
    fn test_invalid_document() {
        let result = DecoderConfig::from_toml_str("[cache]\nmax_size = \"big\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_claims_jpeg() {
        let config = DecoderConfig::default();
        assert!(config.claims_jpeg("a.jpg"));
        assert!(config.claims_jpeg("dir/b.jpeg"));
        assert!(!config.claims_jpeg("c.png"));
        assert!(!config.claims_jpeg("noext"));
        // Extension matching is case-sensitive
        assert!(!config.claims_jpeg("D.JPG"));
    }

    #[test]
    fn test_limits_allow() {
        let limits = DecodeLimits {
            max_width: Some(100),
            max_height: Some(50),
            max_alloc: Some(1000),
        };
        assert!(limits.allows(100, 50, 1000));
        assert!(!limits.allows(101, 50, 10));
        assert!(!limits.allows(10, 51, 10));
        assert!(!limits.allows(10, 10, 1001));
        assert!(DecodeLimits::unlimited().allows(u32::MAX, u32::MAX, usize::MAX));
    }

    #[test]
    fn test_decoder_options_are_strict_rgb() {
        let options = DecodeLimits::default().to_decoder_options();
        assert!(options.strict_mode());
        assert_eq!(options.jpeg_get_out_colorspace(), ColorSpace::RGB);
        assert_eq!(options.max_width(), usize::from(u16::MAX));
    }
}
