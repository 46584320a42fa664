//! Lease-counted, size-bounded cache store.
//!
//! All access goes through [`CacheStore::lock`], which returns a
//! [`CacheGuard`] holding the store's single mutex until it is dropped.
//! Lookups, inserts, lease changes and evictions therefore share one
//! critical section, and early returns can't leave the store locked.
//!
//! # Eviction
//!
//! Each entry carries a `weight` (a cost hint set by its producer) and a
//! `life` score. A hit adds the entry's weight to its life; every insert
//! ages all other entries by one. When an insert would exceed `max_size`,
//! entries with no outstanding lease are invalidated lowest-life first.
//! An entry with a lease is never invalidated.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::CacheConfig;

/// Tag distinguishing the producers that share one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheDataType(u32);

/// Stable identifier of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSourceType {
    Path,
    Pointer,
}

/// Identity of the source an entry was produced from.
///
/// The kind is part of the identity: a path never equals a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheSource {
    Path(Box<str>),
    Pointer(usize),
}

impl CacheSource {
    pub fn path(path: &str) -> Self {
        CacheSource::Path(path.into())
    }

    pub fn source_type(&self) -> CacheSourceType {
        match self {
            CacheSource::Path(_) => CacheSourceType::Path,
            CacheSource::Pointer(_) => CacheSourceType::Pointer,
        }
    }
}

/// Called exactly once when the store evicts an entry.
pub type InvalidateFn<T> = fn(&mut CacheEntry<T>);

pub struct CacheEntry<T> {
    id: EntryId,
    data: Option<Arc<T>>,
    data_size: usize,
    data_type: CacheDataType,
    ref_cnt: usize,
    life: i64,
    /// Cost hint; higher weights survive longer under pressure.
    pub weight: u32,
    pub src: Option<CacheSource>,
    pub invalidate_cb: Option<InvalidateFn<T>>,
}

impl<T> std::fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id)
            .field("data_size", &self.data_size)
            .field("data_type", &self.data_type)
            .field("ref_cnt", &self.ref_cnt)
            .field("life", &self.life)
            .field("weight", &self.weight)
            .field("src", &self.src)
            .finish_non_exhaustive()
    }
}

impl<T> CacheEntry<T> {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn data(&self) -> Option<&Arc<T>> {
        self.data.as_ref()
    }

    /// Remove the payload from the entry, leaving it empty.
    pub fn take_data(&mut self) -> Option<Arc<T>> {
        self.data.take()
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn data_type(&self) -> CacheDataType {
        self.data_type
    }

    /// Number of outstanding leases.
    pub fn lease_count(&self) -> usize {
        self.ref_cnt
    }

    pub fn life(&self) -> i64 {
        self.life
    }

    pub fn src_type(&self) -> Option<CacheSourceType> {
        self.src.as_ref().map(CacheSource::source_type)
    }

    fn matches(&self, data_type: Option<CacheDataType>, src: &CacheSource) -> bool {
        data_type.map_or(true, |dt| dt == self.data_type) && self.src.as_ref() == Some(src)
    }
}

struct StoreInner<T> {
    entries: Vec<CacheEntry<T>>,
    cur_size: usize,
    next_id: u64,
}

pub struct CacheStore<T> {
    max_size: usize,
    next_data_type: AtomicU32,
    inner: Mutex<StoreInner<T>>,
}

impl<T> CacheStore<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            next_data_type: AtomicU32::new(0),
            inner: Mutex::new(StoreInner {
                entries: Vec::new(),
                cur_size: 0,
                next_id: 0,
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Hand out a fresh data type tag.
    pub fn register_data_type(&self) -> CacheDataType {
        CacheDataType(self.next_data_type.fetch_add(1, Ordering::Relaxed))
    }

    /// Acquire the store lock. It is released when the guard drops.
    pub fn lock(&self) -> CacheGuard<'_, T> {
        CacheGuard {
            max_size: self.max_size,
            inner: self.inner.lock(),
        }
    }
}

/// Scoped access to a locked [`CacheStore`].
pub struct CacheGuard<'a, T> {
    max_size: usize,
    inner: MutexGuard<'a, StoreInner<T>>,
}

impl<T> CacheGuard<'_, T> {
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Bytes currently held.
    pub fn size(&self) -> usize {
        self.inner.cur_size
    }

    pub fn entry(&self, id: EntryId) -> Option<&CacheEntry<T>> {
        self.inner.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut CacheEntry<T>> {
        self.inner.entries.iter_mut().find(|e| e.id == id)
    }

    /// Find the entry produced from `src` and take a lease on it.
    ///
    /// With `data_type` of `None` any producer's entry matches.
    pub fn find_by_source(
        &mut self,
        data_type: Option<CacheDataType>,
        src: &CacheSource,
    ) -> Option<EntryId> {
        let entry = self
            .inner
            .entries
            .iter_mut()
            .find(|e| e.matches(data_type, src))?;
        entry.ref_cnt += 1;
        entry.life = entry.life.saturating_add(i64::from(entry.weight));
        tracing::trace!(entry = entry.id.0, leases = entry.ref_cnt, "cache hit");
        Some(entry.id)
    }

    /// Insert `data` and take a lease on the new entry.
    ///
    /// Unleased entries are evicted to make room. Returns `None`, dropping
    /// `data`, when it can't fit even after eviction.
    pub fn add(
        &mut self,
        data: T,
        data_size: usize,
        data_type: CacheDataType,
        weight: u32,
    ) -> Option<EntryId> {
        if data_size > self.max_size {
            tracing::debug!(
                bytes = data_size,
                max_size = self.max_size,
                "data larger than the whole cache"
            );
            return None;
        }

        while self.inner.cur_size + data_size > self.max_size {
            if !self.evict_one() {
                tracing::debug!(bytes = data_size, "cache full of leased entries");
                return None;
            }
        }

        for entry in &mut self.inner.entries {
            entry.life = entry.life.saturating_sub(1);
        }

        let id = EntryId(self.inner.next_id);
        self.inner.next_id += 1;
        self.inner.cur_size += data_size;
        self.inner.entries.push(CacheEntry {
            id,
            data: Some(Arc::new(data)),
            data_size,
            data_type,
            ref_cnt: 1,
            life: 0,
            weight,
            src: None,
            invalidate_cb: None,
        });
        tracing::trace!(entry = id.0, bytes = data_size, "cache add");
        Some(id)
    }

    /// Shared handle to the entry's payload.
    pub fn get_data(&self, id: EntryId) -> Option<Arc<T>> {
        self.entry(id).and_then(|e| e.data.clone())
    }

    /// Return one lease. The entry stays cached until evicted.
    pub fn release(&mut self, id: EntryId) {
        match self.entry_mut(id) {
            Some(entry) if entry.ref_cnt > 0 => {
                entry.ref_cnt -= 1;
                tracing::trace!(entry = id.0, leases = entry.ref_cnt, "cache release");
            }
            Some(_) => tracing::warn!(entry = id.0, "release of an entry with no leases"),
            None => tracing::warn!(entry = id.0, "release of an unknown entry"),
        }
    }

    /// Invalidate every unleased entry produced from `src`.
    ///
    /// Returns how many entries were removed.
    pub fn invalidate_source(&mut self, src: &CacheSource) -> usize {
        self.invalidate_where(|e| e.src.as_ref() == Some(src))
    }

    /// Invalidate every unleased entry.
    pub fn evict_unused(&mut self) -> usize {
        self.invalidate_where(|_| true)
    }

    /// Invalidate every entry, leased or not.
    ///
    /// Outstanding `Arc` handles from [`get_data`](Self::get_data) keep their
    /// payload alive; a later `release` of a dropped entry is logged and ignored.
    pub fn drop_all(&mut self) -> usize {
        let leased = self.inner.entries.iter().filter(|e| e.ref_cnt > 0).count();
        if leased > 0 {
            tracing::warn!(leased, "dropping cache entries that are still leased");
        }
        let count = self.inner.entries.len();
        while !self.inner.entries.is_empty() {
            self.remove_at(self.inner.entries.len() - 1);
        }
        count
    }

    fn invalidate_where(&mut self, mut predicate: impl FnMut(&CacheEntry<T>) -> bool) -> usize {
        let mut removed = 0;
        let mut idx = 0;
        while idx < self.inner.entries.len() {
            let entry = &self.inner.entries[idx];
            if entry.ref_cnt == 0 && predicate(entry) {
                self.remove_at(idx);
                removed += 1;
            } else {
                idx += 1;
            }
        }
        removed
    }

    /// Evict the unleased entry with the lowest life.
    fn evict_one(&mut self) -> bool {
        let victim = self
            .inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.ref_cnt == 0)
            .min_by_key(|(_, e)| e.life)
            .map(|(idx, _)| idx);

        match victim {
            Some(idx) => {
                self.remove_at(idx);
                true
            }
            None => false,
        }
    }

    fn remove_at(&mut self, idx: usize) {
        let mut entry = self.inner.entries.remove(idx);
        self.inner.cur_size -= entry.data_size;
        tracing::debug!(entry = entry.id.0, bytes = entry.data_size, "cache evict");
        if let Some(invalidate) = entry.invalidate_cb.take() {
            invalidate(&mut entry);
        }
    }
}
