//! Image source identifiers.

use crate::cache::CacheSource;

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// A path resolved through the decoder's filesystem.
    File(String),
    /// An in-memory buffer, identified by its address and length only.
    Pointer { addr: usize, len: usize },
}

impl ImageSource {
    pub fn file(path: impl Into<String>) -> Self {
        ImageSource::File(path.into())
    }

    /// Identify an in-memory buffer by address. The bytes are not retained.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        ImageSource::Pointer {
            addr: bytes.as_ptr() as usize,
            len: bytes.len(),
        }
    }

    pub fn as_path(&self) -> Option<&str> {
        match self {
            ImageSource::File(path) => Some(path),
            ImageSource::Pointer { .. } => None,
        }
    }

    /// The cache key for this source.
    pub fn cache_source(&self) -> CacheSource {
        match self {
            ImageSource::File(path) => CacheSource::path(path),
            ImageSource::Pointer { addr, .. } => CacheSource::Pointer(*addr),
        }
    }
}
