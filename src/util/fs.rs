//! File system utilities for reading a byte range without taking a
//! mutable reference to the file handle (so many Read workers can share
//! one open `std::fs::File` for the same local source).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

use builder_pattern::Builder;
use bytes::Bytes;

use crate::error::{Result, UploadAgentError};

/// A chunk of file bytes paired with the offset/size it was read from.
/// Kept value-shaped (no pointer into the source file) so it can move
/// freely between pipeline stages.
#[derive(Builder, Debug, Clone)]
pub struct ChunkFile {
    #[public]
    bytes: Bytes,
    #[public]
    offset: u64,
    #[public]
    size: u64,
}

impl ChunkFile {
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn chunk_size(&self) -> usize {
        self.size as usize
    }

    pub fn buffer_size(&self) -> usize {
        self.bytes.len()
    }

    /// Reads exactly `size` bytes starting at `offset` from `file`,
    /// using `pread` on unix (no seek, so concurrent readers sharing the
    /// same `File` never race each other's cursor) and a mutex-guarded
    /// seek+read fallback elsewhere.
    pub fn read_from(file: &File, path: &str, offset: u64, size: u64) -> Result<ChunkFile> {
        let mut buffer = vec![0u8; size as usize];
        let n = read_at(file, &mut buffer, offset)
            .map_err(|e| UploadAgentError::seek_read(path, offset, e))?;
        buffer.truncate(n);
        Ok(ChunkFile::new()
            .bytes(Bytes::from(buffer))
            .offset(offset)
            .size(n as u64)
            .build())
    }
}

#[cfg(unix)]
fn read_at(file: &File, buffer: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buffer, offset)
}

#[cfg(not(unix))]
fn read_at(file: &File, buffer: &mut [u8], offset: u64) -> std::io::Result<usize> {
    // Windows `File` has no positioned-read equivalent in std; serialize
    // seek+read behind a process-wide mutex keyed by nothing in
    // particular (correctness over throughput on this platform).
    static SEEK_LOCK: Mutex<()> = Mutex::new(());
    let _guard = SEEK_LOCK.lock().unwrap();
    let mut file = file.try_clone()?;
    file.seek(SeekFrom::Start(offset))?;
    let mut read = 0;
    while read < buffer.len() {
        match file.read(&mut buffer[read..])? {
            0 => break,
            n => read += n,
        }
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_exact_range() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        let file = tmp.reopen().unwrap();
        let chunk = ChunkFile::read_from(&file, "test", 2, 4).unwrap();
        assert_eq!(chunk.as_bytes(), b"2345");
    }

    #[test]
    fn short_final_read_truncates() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"01234").unwrap();
        let file = tmp.reopen().unwrap();
        let chunk = ChunkFile::read_from(&file, "test", 3, 10).unwrap();
        assert_eq!(chunk.as_bytes(), b"34");
        assert_eq!(chunk.chunk_size(), 2);
    }
}
