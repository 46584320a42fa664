//! In-memory filesystem backend.
//!
//! Useful for hosts that ship images inside the binary, and for tests: the
//! backend counts live handles so callers can check that every handle they
//! opened was closed.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{FileHandle, FileSystem, FsError};

#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the file at `path`.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.files.write().insert(path.into(), bytes.into());
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(path).is_some()
    }

    /// Number of handles opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl FileSystem for MemoryFileSystem {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>, FsError> {
        let data = self.files.read().get(path).cloned().ok_or(FsError::NotFound)?;
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryFile {
            data,
            pos: 0,
            open_handles: Arc::clone(&self.open_handles),
        }))
    }
}

struct MemoryFile {
    data: Arc<[u8]>,
    pos: u64,
    open_handles: Arc<AtomicUsize>,
}

impl FileHandle for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let start = usize::try_from(self.pos)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), FsError> {
        let len = self.data.len() as i128;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(offset) => len + offset as i128,
            SeekFrom::Current(offset) => self.pos as i128 + offset as i128,
        };
        if target < 0 || target > u64::MAX as i128 {
            return Err(FsError::Io(format!("invalid seek to {target}")));
        }
        self.pos = target as u64;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64, FsError> {
        Ok(self.pos)
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
