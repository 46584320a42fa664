//! Lookup-before-decode and insert-after-decode for decoded rasters.
//!
//! Only path sources are ever stored, so only path sources can hit. Raster
//! memory and the owned path copy are released in one place,
//! [`invalidate_raster`], which the store calls when it evicts an entry.

use std::sync::Arc;

use super::store::{CacheDataType, CacheEntry, CacheSource, CacheSourceType, CacheStore, EntryId};
use crate::decode::{DecodeError, DecodedRaster, ImageHeader};
use crate::source::ImageSource;

/// A leased, read-only view of a cached raster.
///
/// Each view holds one lease on its entry and must be handed back through
/// [`RasterCache::release`] exactly once.
#[derive(Debug)]
pub struct RasterView {
    entry: EntryId,
    raster: Arc<DecodedRaster>,
}

impl RasterView {
    pub fn entry_id(&self) -> EntryId {
        self.entry
    }

    pub fn header(&self) -> ImageHeader {
        self.raster.header()
    }

    pub fn pixels(&self) -> &[u8] {
        self.raster.pixels()
    }

    pub fn raster(&self) -> &Arc<DecodedRaster> {
        &self.raster
    }
}

pub struct RasterCache {
    store: Arc<CacheStore<DecodedRaster>>,
    data_type: CacheDataType,
}

impl RasterCache {
    /// Attach to `store` under a freshly registered data type.
    pub fn new(store: Arc<CacheStore<DecodedRaster>>) -> Self {
        let data_type = store.register_data_type();
        Self { store, data_type }
    }

    pub fn store(&self) -> &Arc<CacheStore<DecodedRaster>> {
        &self.store
    }

    pub fn data_type(&self) -> CacheDataType {
        self.data_type
    }

    /// Look `src` up and lease the matching entry.
    ///
    /// Pointer sources are never stored and always miss.
    pub fn try_cache(&self, src: &ImageSource) -> Option<RasterView> {
        let mut cache = self.store.lock();
        let ImageSource::File(path) = src else {
            return None;
        };

        let entry = cache.find_by_source(Some(self.data_type), &CacheSource::path(path))?;
        match cache.get_data(entry) {
            Some(raster) => {
                tracing::debug!(path = %path, "cache hit");
                Some(RasterView { entry, raster })
            }
            None => {
                cache.release(entry);
                None
            }
        }
    }

    /// Store a freshly decoded raster for `path` and lease it.
    ///
    /// If another request inserted `path` while this one was decoding, the
    /// existing entry wins: `raster` is dropped and the existing entry is
    /// leased instead.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::OutOfMemory` if the store has no room for it.
    pub fn insert(
        &self,
        path: &str,
        raster: DecodedRaster,
        weight: u32,
    ) -> Result<RasterView, DecodeError> {
        let src = CacheSource::path(path);
        let mut cache = self.store.lock();

        if let Some(entry) = cache.find_by_source(Some(self.data_type), &src) {
            if let Some(existing) = cache.get_data(entry) {
                tracing::debug!(path, "raster already cached; dropping duplicate decode");
                return Ok(RasterView {
                    entry,
                    raster: existing,
                });
            }
            cache.release(entry);
        }

        let size = raster.byte_size();
        let entry = cache
            .add(raster, size, self.data_type, weight)
            .ok_or_else(|| {
                tracing::warn!(path, bytes = size, "no room in cache for raster");
                DecodeError::OutOfMemory
            })?;

        let raster = cache.get_data(entry).ok_or(DecodeError::OutOfMemory)?;
        if let Some(record) = cache.entry_mut(entry) {
            record.weight = weight;
            record.src = Some(src);
            record.invalidate_cb = Some(invalidate_raster);
        }
        tracing::debug!(path, bytes = size, weight, "raster cached");
        Ok(RasterView { entry, raster })
    }

    /// Return the lease held by `view`.
    pub fn release(&self, view: RasterView) {
        let RasterView { entry, raster } = view;
        let mut cache = self.store.lock();
        drop(raster);
        cache.release(entry);
    }
}

/// Release a raster entry's payload and its owned path copy.
fn invalidate_raster(entry: &mut CacheEntry<DecodedRaster>) {
    if entry.src_type() == Some(CacheSourceType::Path) {
        entry.src = None;
    }
    drop(entry.take_data());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: u32, height: u32) -> DecodedRaster {
        let header = ImageHeader::new(width, height);
        DecodedRaster::new(header, vec![0u8; header.byte_size().unwrap()])
    }

    fn cache(max_size: usize) -> RasterCache {
        RasterCache::new(Arc::new(CacheStore::new(max_size)))
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = cache(10_000);
        let src = ImageSource::file("a.jpg");
        assert!(cache.try_cache(&src).is_none());

        let first = cache.insert("a.jpg", raster(4, 4), 12).unwrap();
        let second = cache.try_cache(&src).unwrap();

        assert!(Arc::ptr_eq(first.raster(), second.raster()));
        assert_eq!(second.header(), ImageHeader::new(4, 4));
        assert_eq!(first.entry_id(), second.entry_id());

        let store = cache.store().lock();
        let entry = store.entry(first.entry_id()).unwrap();
        assert_eq!(entry.lease_count(), 2);
        assert_eq!(entry.weight, 12);
        assert_eq!(entry.src_type(), Some(CacheSourceType::Path));
    }

    #[test]
    fn test_pointer_sources_always_miss() {
        let cache = cache(10_000);
        let bytes = [0xFFu8, 0xD8, 0xFF, 0xE0];
        let src = ImageSource::from_bytes(&bytes);

        assert!(cache.try_cache(&src).is_none());
        assert!(cache.store().lock().is_empty());
    }

    #[test]
    fn test_duplicate_insert_keeps_first() {
        let cache = cache(10_000);
        let first = cache.insert("a.jpg", raster(4, 4), 1).unwrap();
        let loser = raster(4, 4);
        let second = cache.insert("a.jpg", loser, 1).unwrap();

        assert!(Arc::ptr_eq(first.raster(), second.raster()));
        let store = cache.store().lock();
        assert_eq!(store.len(), 1);
        assert_eq!(store.entry(first.entry_id()).unwrap().lease_count(), 2);
    }

    #[test]
    fn test_release_keeps_entry_until_evicted() {
        let cache = cache(10_000);
        let view = cache.insert("a.jpg", raster(2, 2), 1).unwrap();
        let weak = Arc::downgrade(view.raster());
        let id = view.entry_id();

        cache.release(view);
        assert!(weak.upgrade().is_some());
        assert_eq!(cache.store().lock().entry(id).unwrap().lease_count(), 0);

        assert_eq!(cache.store().lock().evict_unused(), 1);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_leased_raster_survives_pressure() {
        // Room for exactly one 4x4 raster (48 bytes)
        let cache = cache(48);
        let view = cache.insert("a.jpg", raster(4, 4), 1).unwrap();
        let weak = Arc::downgrade(view.raster());

        let result = cache.insert("b.jpg", raster(4, 4), 1);
        assert!(matches!(result, Err(DecodeError::OutOfMemory)));
        assert!(weak.upgrade().is_some());

        cache.release(view);
        let other = cache.insert("b.jpg", raster(4, 4), 1).unwrap();
        assert!(weak.upgrade().is_none());
        cache.release(other);
    }

    #[test]
    fn test_invalidate_clears_path_and_data() {
        let store: CacheStore<DecodedRaster> = CacheStore::new(1000);
        let dt = store.register_data_type();
        let mut guard = store.lock();
        let id = guard.add(raster(1, 1), 3, dt, 1).unwrap();
        let entry = guard.entry_mut(id).unwrap();
        entry.src = Some(CacheSource::path("a.jpg"));

        invalidate_raster(entry);
        assert!(entry.src.is_none());
        assert!(entry.data().is_none());
    }
}
