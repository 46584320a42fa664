//! JPEG decoder lifecycle hooks.

use std::sync::Arc;

use rastercache_core::{CacheStore, DecodedRaster, DecoderConfig, FileSystem, JpegDecoder};

use crate::registry::{DecoderHandle, DecoderRegistry};

/// Create a JPEG decoder over `fs` and `store` and register it.
///
/// The decoder registers its own data type with `store`, so several decoders
/// can share one store without seeing each other's entries.
pub fn jpeg_init(
    registry: &mut DecoderRegistry,
    fs: Arc<dyn FileSystem>,
    store: Arc<CacheStore<DecodedRaster>>,
    config: DecoderConfig,
) -> DecoderHandle {
    let decoder = JpegDecoder::new(fs, store, config);
    tracing::info!(
        data_type = ?decoder.cache().data_type(),
        extensions = ?decoder.config().jpeg_extensions,
        "jpeg decoder ready"
    );
    registry.register(Arc::new(decoder))
}

/// Unregister the most recently registered JPEG decoder.
///
/// Returns `false` if none was registered.
pub fn jpeg_deinit(registry: &mut DecoderRegistry) -> bool {
    registry
        .find_by_name(JpegDecoder::NAME)
        .is_some_and(|handle| registry.unregister(handle))
}
