//! RasterCache Host - decoder registry and dispatch
//!
//! This crate is the host side of the decoder plugin interface: it owns the
//! list of registered decoders and routes `info`/`open`/`close` requests to
//! them.
//!
//! # Module Structure
//!
//! - `registry` - the decoder registry and its dispatch rules
//! - `jpeg` - init/deinit hooks for the JPEG decoder
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = DecoderRegistry::new();
//! let store = Arc::new(CacheStore::from_config(&config.cache));
//! jpeg_init(&mut registry, Arc::new(StdFileSystem::new()), store, config);
//!
//! let image = registry.open(&ImageSource::file("photo.jpg"))?;
//! println!("{}x{}", image.header().width, image.header().height);
//! registry.close(image);
//! ```

mod jpeg;
mod registry;

pub use jpeg::{jpeg_deinit, jpeg_init};
pub use registry::{DecoderHandle, DecoderRegistry, OpenedImage};

/// Get the version of the host crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
