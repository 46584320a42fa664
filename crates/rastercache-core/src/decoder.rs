//! The decoder plugin interface and the JPEG decoder behind it.
//!
//! A host drives decoders through three calls:
//!
//! - `info` - probe a source's header for layout
//! - `open` - produce a leased view of the decoded raster
//! - `close` - hand the lease back
//!
//! Every failure crosses this boundary as [`Invalid`]; the reason is logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::cache::{CacheStore, RasterCache, RasterView};
use crate::config::DecoderConfig;
use crate::decode::{
    decode_jpeg_file, is_jpeg_signature, probe_jpeg_size, DecodedRaster, ImageHeader,
};
use crate::fs::FileSystem;
use crate::source::ImageSource;

/// The source can't be handled by this decoder, or handling it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("image source is invalid for this decoder")]
pub struct Invalid;

/// The callbacks a host's decoder dispatch expects.
pub trait DecoderPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn info(&self, src: &ImageSource) -> Result<ImageHeader, Invalid>;

    fn open(&self, src: &ImageSource) -> Result<RasterView, Invalid>;

    /// Called exactly once for every successful `open`.
    fn close(&self, view: RasterView);
}

/// Counters for decoder activity.
#[derive(Debug, Default)]
pub struct DecoderStats {
    decodes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Full decodes attempted.
    pub decodes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Opens that returned `Invalid` after a miss.
    pub failures: u64,
}

impl DecoderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            decodes: self.decodes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// JPEG decoder backed by a shared raster cache.
pub struct JpegDecoder {
    fs: Arc<dyn FileSystem>,
    cache: RasterCache,
    config: DecoderConfig,
    stats: DecoderStats,
}

impl JpegDecoder {
    pub const NAME: &'static str = "jpeg";

    pub fn new(
        fs: Arc<dyn FileSystem>,
        store: Arc<CacheStore<DecodedRaster>>,
        config: DecoderConfig,
    ) -> Self {
        Self {
            fs,
            cache: RasterCache::new(store),
            config,
            stats: DecoderStats::default(),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn cache(&self) -> &RasterCache {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Read the leading four bytes of `path`; the handle is closed on return.
    fn read_signature(&self, path: &str) -> Result<u32, Invalid> {
        let mut file = self.fs.open(path).map_err(|err| {
            tracing::warn!(path, error = %err, "can't open file");
            Invalid
        })?;

        let mut head = [0u8; 4];
        let read = file.read(&mut head);
        drop(file);

        let read = read.map_err(|err| {
            tracing::warn!(path, error = %err, "can't read signature");
            Invalid
        })?;
        if read != head.len() {
            tracing::warn!(path, read, "signature length error");
            return Err(Invalid);
        }
        Ok(u32::from_le_bytes(head))
    }
}

impl DecoderPlugin for JpegDecoder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn info(&self, src: &ImageSource) -> Result<ImageHeader, Invalid> {
        let ImageSource::File(path) = src else {
            return Err(Invalid);
        };

        let signature = self.read_signature(path)?;
        if !is_jpeg_signature(signature) {
            if self.config.claims_jpeg(path) {
                tracing::warn!(
                    path = %path,
                    signature = %format!("{signature:#X}"),
                    "signature error"
                );
            }
            return Err(Invalid);
        }

        let (width, height) =
            probe_jpeg_size(self.fs.as_ref(), path, &self.config).map_err(|err| {
                tracing::debug!(path = %path, error = %err, "header probe failed");
                Invalid
            })?;
        Ok(ImageHeader::new(width, height))
    }

    fn open(&self, src: &ImageSource) -> Result<RasterView, Invalid> {
        if let Some(view) = self.cache.try_cache(src) {
            DecoderStats::bump(&self.stats.cache_hits);
            return Ok(view);
        }
        DecoderStats::bump(&self.stats.cache_misses);

        let ImageSource::File(path) = src else {
            DecoderStats::bump(&self.stats.failures);
            return Err(Invalid);
        };

        DecoderStats::bump(&self.stats.decodes);
        let started = Instant::now();
        let decoded = decode_jpeg_file(self.fs.as_ref(), path, &self.config.limits);
        let weight = u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX);

        decoded
            .and_then(|raster| self.cache.insert(path, raster, weight))
            .map_err(|err| {
                DecoderStats::bump(&self.stats.failures);
                tracing::debug!(path = %path, error = %err, "open failed");
                Invalid
            })
    }

    fn close(&self, view: RasterView) {
        self.cache.release(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;

    use crate::fs::{FileHandle, FsError, MemoryFileSystem, StdFileSystem};
    use crate::test_support::{
        capture_logs, corrupt_scan, encode_jpeg_fixture, scan_data, truncate_in_scan,
        MINIMAL_JPEG,
    };

    struct Fixture {
        fs: Arc<MemoryFileSystem>,
        store: Arc<CacheStore<DecodedRaster>>,
        decoder: JpegDecoder,
    }

    fn fixture() -> Fixture {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = Arc::new(CacheStore::new(1024 * 1024));
        let decoder = JpegDecoder::new(fs.clone(), store.clone(), DecoderConfig::default());
        Fixture { fs, store, decoder }
    }

    #[test]
    fn test_info_then_open_16x16() {
        let f = fixture();
        f.fs.insert("a.jpg", encode_jpeg_fixture(16, 16, [200, 100, 50]));
        let src = ImageSource::file("a.jpg");

        let header = f.decoder.info(&src).unwrap();
        assert_eq!(header, ImageHeader::new(16, 16));

        let view = f.decoder.open(&src).unwrap();
        assert_eq!(view.header(), header);
        assert_eq!(view.pixels().len(), 768);

        f.decoder.close(view);
        assert_eq!(f.fs.open_handles(), 0);
    }

    #[test]
    fn test_second_open_is_a_cache_hit() {
        let f = fixture();
        f.fs.insert("a.jpg", encode_jpeg_fixture(16, 16, [0, 0, 0]));
        let src = ImageSource::file("a.jpg");

        let first = f.decoder.open(&src).unwrap();
        let second = f.decoder.open(&src).unwrap();
        assert!(Arc::ptr_eq(first.raster(), second.raster()));

        let stats = f.decoder.stats();
        assert_eq!(stats.decodes, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);

        let id = first.entry_id();
        f.decoder.close(first);
        assert_eq!(f.store.lock().entry(id).unwrap().lease_count(), 1);
        f.decoder.close(second);
        assert_eq!(f.store.lock().entry(id).unwrap().lease_count(), 0);

        // Both leases returned: the entry is now evictable
        assert_eq!(f.store.lock().evict_unused(), 1);
    }

    #[test]
    fn test_entry_weight_is_decode_latency() {
        let f = fixture();
        f.fs.insert("a.jpg", encode_jpeg_fixture(8, 8, [1, 2, 3]));

        let view = f.decoder.open(&ImageSource::file("a.jpg")).unwrap();
        let store = f.store.lock();
        let entry = store.entry(view.entry_id()).unwrap();
        // Latency in milliseconds; a tiny decode fits comfortably under a minute
        assert!(entry.weight < 60_000);
        assert_eq!(entry.src_type(), Some(crate::cache::CacheSourceType::Path));
    }

    #[test]
    fn test_raster_never_freed_while_leased() {
        let fs = Arc::new(MemoryFileSystem::new());
        // Room for a single 16x16 raster
        let store = Arc::new(CacheStore::new(768));
        let decoder = JpegDecoder::new(fs.clone(), store.clone(), DecoderConfig::default());
        fs.insert("a.jpg", encode_jpeg_fixture(16, 16, [9, 9, 9]));
        fs.insert("b.jpg", encode_jpeg_fixture(16, 16, [9, 9, 9]));

        let a = decoder.open(&ImageSource::file("a.jpg")).unwrap();
        let weak = Arc::downgrade(a.raster());

        // No room while `a` is leased
        assert_eq!(decoder.open(&ImageSource::file("b.jpg")).unwrap_err(), Invalid);
        assert!(weak.upgrade().is_some());

        decoder.close(a);
        let b = decoder.open(&ImageSource::file("b.jpg")).unwrap();
        assert!(weak.upgrade().is_none());
        decoder.close(b);
    }

    #[test]
    fn test_info_bad_signature_with_jpeg_extension_warns() {
        let f = fixture();
        f.fs.insert("b.jpg", vec![0x00u8, 0x00, 0x00, 0x00]);

        let (result, logs) = capture_logs(|| f.decoder.info(&ImageSource::file("b.jpg")));
        assert_eq!(result, Err(Invalid));
        assert!(logs.contains("signature error"), "logs: {logs}");
    }

    #[test]
    fn test_info_bad_signature_other_extension_is_silent() {
        let f = fixture();
        f.fs.insert("b.bmp", vec![0x42u8, 0x4D, 0x00, 0x00, 0x00]);

        let (result, logs) = capture_logs(|| f.decoder.info(&ImageSource::file("b.bmp")));
        assert_eq!(result, Err(Invalid));
        assert!(!logs.contains("signature"), "logs: {logs}");
    }

    #[test]
    fn test_info_missing_file_has_no_signature_warning() {
        let f = fixture();

        let (result, logs) = capture_logs(|| f.decoder.info(&ImageSource::file("nope.jpg")));
        assert_eq!(result, Err(Invalid));
        assert!(logs.contains("can't open file"), "logs: {logs}");
        assert!(!logs.contains("signature"), "logs: {logs}");
    }

    #[test]
    fn test_info_short_file() {
        let f = fixture();
        f.fs.insert("short.jpg", vec![0xFFu8, 0xD8]);

        let (result, logs) = capture_logs(|| f.decoder.info(&ImageSource::file("short.jpg")));
        assert_eq!(result, Err(Invalid));
        assert!(logs.contains("signature length error"), "logs: {logs}");
        assert_eq!(f.fs.open_handles(), 0);
    }

    #[test]
    fn test_info_is_idempotent() {
        let f = fixture();
        f.fs.insert("a.jpeg", encode_jpeg_fixture(21, 13, [5, 6, 7]));
        let src = ImageSource::file("a.jpeg");

        let first = f.decoder.info(&src).unwrap();
        let second = f.decoder.info(&src).unwrap();
        assert_eq!(first, second);
        assert!(f.store.lock().is_empty());
    }

    #[test]
    fn test_pointer_sources_are_invalid() {
        let f = fixture();
        let src = ImageSource::from_bytes(MINIMAL_JPEG);

        assert_eq!(f.decoder.info(&src), Err(Invalid));
        assert_eq!(f.decoder.open(&src).unwrap_err(), Invalid);
        assert_eq!(f.decoder.stats().decodes, 0);
        assert!(f.store.lock().is_empty());
    }

    fn assert_open_fails_and_leaves_nothing(f: &Fixture, path: &str) {
        let src = ImageSource::file(path);
        let failures = f.decoder.stats().failures;

        let (result, logs) = capture_logs(|| f.decoder.open(&src));
        assert_eq!(result.unwrap_err(), Invalid);
        assert!(logs.contains("decoding error"), "logs: {logs}");
        assert_eq!(f.decoder.stats().failures, failures + 1);
        assert!(f.store.lock().is_empty());
        assert_eq!(f.fs.open_handles(), 0);

        // Nothing was cached, so a retry decodes and fails again
        assert_eq!(f.decoder.open(&src).unwrap_err(), Invalid);
        assert_eq!(f.decoder.stats().failures, failures + 2);
        assert_eq!(f.decoder.stats().cache_hits, 0);
    }

    #[test]
    fn test_corrupt_header_is_invalid_and_leaves_nothing() {
        let f = fixture();
        f.fs.insert("bad.jpg", MINIMAL_JPEG[0..20].to_vec());

        assert_open_fails_and_leaves_nothing(&f, "bad.jpg");
    }

    #[test]
    fn test_truncated_body_is_invalid_and_leaves_nothing() {
        let f = fixture();
        let jpeg = encode_jpeg_fixture(64, 64, [30, 160, 90]);
        let scan = scan_data(&jpeg);
        f.fs.insert("cut_early.jpg", truncate_in_scan(&jpeg, 20));
        f.fs.insert("cut_middle.jpg", truncate_in_scan(&jpeg, scan.len() / 2));
        f.fs.insert("no_end.jpg", jpeg[..jpeg.len() - 2].to_vec());

        for path in ["cut_early.jpg", "cut_middle.jpg", "no_end.jpg"] {
            // The header is intact, so the source still probes fine
            assert_eq!(
                f.decoder.info(&ImageSource::file(path)),
                Ok(ImageHeader::new(64, 64))
            );
            assert_open_fails_and_leaves_nothing(&f, path);
        }
    }

    #[test]
    fn test_corrupt_body_is_invalid_and_leaves_nothing() {
        let f = fixture();
        f.fs.insert(
            "bad.jpg",
            corrupt_scan(encode_jpeg_fixture(64, 64, [30, 160, 90])),
        );

        assert_open_fails_and_leaves_nothing(&f, "bad.jpg");
    }

    /// Opens succeed; every read fails.
    struct UnreadableFileSystem;

    struct UnreadableFile;

    impl FileSystem for UnreadableFileSystem {
        fn open(&self, _path: &str) -> Result<Box<dyn FileHandle>, FsError> {
            Ok(Box::new(UnreadableFile))
        }
    }

    impl FileHandle for UnreadableFile {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, FsError> {
            Err(FsError::Io("device error".into()))
        }

        fn seek(&mut self, _pos: SeekFrom) -> Result<(), FsError> {
            Ok(())
        }

        fn tell(&mut self) -> Result<u64, FsError> {
            Ok(0)
        }
    }

    #[test]
    fn test_info_read_failure_is_reported() {
        let store = Arc::new(CacheStore::new(1024));
        let decoder = JpegDecoder::new(
            Arc::new(UnreadableFileSystem),
            store,
            DecoderConfig::default(),
        );

        let (result, logs) = capture_logs(|| decoder.info(&ImageSource::file("a.jpg")));
        assert_eq!(result, Err(Invalid));
        assert!(logs.contains("can't read signature"), "logs: {logs}");
        assert!(logs.contains("device error"), "logs: {logs}");
        assert!(!logs.contains("signature length error"), "logs: {logs}");
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), encode_jpeg_fixture(16, 16, [0, 0, 0])).unwrap();

        let fs = Arc::new(StdFileSystem::with_root(dir.path()));
        let store = Arc::new(CacheStore::new(1024 * 1024));
        let decoder = JpegDecoder::new(fs, store, DecoderConfig::default());
        let src = ImageSource::file("a.jpg");

        assert_eq!(decoder.info(&src).unwrap(), ImageHeader::new(16, 16));
        let view = decoder.open(&src).unwrap();
        assert_eq!(view.pixels().len(), 768);
        decoder.close(view);
    }

    #[test]
    fn test_concurrent_opens_share_one_entry() {
        let f = fixture();
        f.fs.insert("a.jpg", encode_jpeg_fixture(32, 32, [10, 20, 30]));
        let decoder = Arc::new(f.decoder);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let decoder = Arc::clone(&decoder);
                std::thread::spawn(move || decoder.open(&ImageSource::file("a.jpg")).unwrap())
            })
            .collect();
        let views: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for view in &views[1..] {
            assert!(Arc::ptr_eq(views[0].raster(), view.raster()));
        }
        {
            let store = f.store.lock();
            assert_eq!(store.len(), 1);
            assert_eq!(store.entry(views[0].entry_id()).unwrap().lease_count(), 8);
        }

        for view in views {
            decoder.close(view);
        }
        assert_eq!(f.store.lock().evict_unused(), 1);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================
