//! Filesystem backend over `std::fs`.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::{FileHandle, FileSystem, FsError};

/// Reads files from the process filesystem.
///
/// Relative paths are resolved against `root` when one is configured.
#[derive(Debug, Clone, Default)]
pub struct StdFileSystem {
    root: Option<PathBuf>,
}

impl StdFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl FileSystem for StdFileSystem {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>, FsError> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(StdFile { file }))
    }
}

struct StdFile {
    file: File,
}

impl FileHandle for StdFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(filled)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), FsError> {
        self.file.seek(pos)?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64, FsError> {
        Ok(self.file.stream_position()?)
    }
}
