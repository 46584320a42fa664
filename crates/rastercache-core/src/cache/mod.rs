//! Shared raster cache.
//!
//! - [`store`] - the lease-counted, size-bounded store and its scoped lock
//! - [`raster`] - the lookup/insert/release protocol decoders use on top of it
//!
//! # Concurrency
//!
//! The store's mutex is the only lock. Lookup, insert, lease changes and
//! invalidation run under it; decoding runs outside it. Two requests that
//! miss on the same path can both decode, and the second insert is resolved
//! in favour of the entry already present.

pub mod raster;
pub mod store;

pub use raster::{RasterCache, RasterView};
pub use store::{
    CacheDataType, CacheEntry, CacheGuard, CacheSource, CacheSourceType, CacheStore, EntryId,
    InvalidateFn,
};
