//! Whole-file loading into one owned buffer.

use std::io::SeekFrom;

use crate::fs::{FileHandle, FileSystem};

use super::DecodeError;

/// Read the entire file at `path` into memory.
///
/// The file handle is dropped, and so closed, on every return path.
///
/// # Errors
///
/// - `DecodeError::NotFound` / `DecodeError::IoError` if the file can't be opened
/// - `DecodeError::IoError` if seeking or telling fails
/// - `DecodeError::OutOfMemory` if the buffer can't be allocated
/// - `DecodeError::ShortRead` if fewer bytes arrive than the file size
pub fn load_file(fs: &dyn FileSystem, path: &str) -> Result<Vec<u8>, DecodeError> {
    let mut file = fs.open(path).map_err(|err| {
        tracing::warn!(path, error = %err, "can't open file");
        DecodeError::from_fs(err, path)
    })?;

    let size = file_size(file.as_mut()).map_err(|err| DecodeError::from_fs(err, path))?;
    let size = usize::try_from(size).map_err(|_| DecodeError::OutOfMemory)?;

    let mut data = Vec::new();
    if data.try_reserve_exact(size).is_err() {
        tracing::warn!(path, bytes = size, "allocation failed for file data");
        return Err(DecodeError::OutOfMemory);
    }
    data.resize(size, 0);

    let read = file
        .read(&mut data)
        .map_err(|err| DecodeError::from_fs(err, path))?;
    if read != size {
        tracing::warn!(path, expected = size, actual = read, "read file failed");
        return Err(DecodeError::ShortRead {
            expected: size,
            actual: read,
        });
    }

    tracing::trace!(path, bytes = size, "loaded file");
    Ok(data)
}

fn file_size(file: &mut dyn FileHandle) -> Result<u64, crate::fs::FsError> {
    file.seek(SeekFrom::End(0))?;
    let size = file.tell()?;
    file.seek(SeekFrom::Start(0))?;
    Ok(size)
}
