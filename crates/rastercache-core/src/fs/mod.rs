//! Read-only filesystem abstraction the loader decodes from.
//!
//! Hosts plug their own storage in through [`FileSystem`]. Two backends ship
//! with the crate:
//!
//! - [`StdFileSystem`] - the process filesystem via `std::fs`
//! - [`MemoryFileSystem`] - an in-memory map of path to bytes
//!
//! Handles are closed by dropping them, so every exit path of a caller
//! releases the handle exactly once.

mod memory;
mod std_fs;

pub use memory::MemoryFileSystem;
pub use std_fs::StdFileSystem;

use std::io::SeekFrom;

use thiserror::Error;

/// Errors reported by a [`FileSystem`] backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("file not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound,
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            _ => FsError::Io(err.to_string()),
        }
    }
}

/// An open, readable file. Dropping the handle closes it.
pub trait FileHandle: Send {
    /// Fill as much of `buf` as the file allows and return the byte count.
    ///
    /// A return value smaller than `buf.len()` means end of file was reached.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError>;

    fn seek(&mut self, pos: SeekFrom) -> Result<(), FsError>;

    /// Current offset from the start of the file.
    fn tell(&mut self) -> Result<u64, FsError>;
}

/// A source of readable files, addressed by path string.
pub trait FileSystem: Send + Sync {
    /// Open `path` for reading.
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>, FsError>;
}

/// Extension of the file name in `path`, without the dot.
///
/// Returns an empty string when the file name has no extension.
pub fn extension(path: &str) -> &str {
    let name = path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => &name[idx + 1..],
        _ => "",
    }
}
