//! `UploadFile` models spec §3's "File": identity, destination, derived
//! fields, and the mutable state the owning main task and its Chunks
//! update as the upload progresses.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::constant::MIN_CHUNK_SIZE;
use crate::error::{Result, UploadAgentError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Default)]
pub struct Destination {
    pub project: String,
    pub folder: String,
    pub name: String,
    pub visibility: Visibility,
    pub properties: std::collections::HashMap<String, String>,
    pub tags: Vec<String>,
    pub object_type: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct LocalSource {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: SystemTime,
}

impl LocalSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)
            .map_err(|e| UploadAgentError::io(path.display().to_string(), e))?;
        if !meta.is_file() {
            return Err(UploadAgentError::io(
                path.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    pub fn mtime_unix_secs(&self) -> u64 {
        self.mtime
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn canonical_path(&self) -> String {
        std::fs::canonicalize(&self.path)
            .unwrap_or_else(|_| self.path.clone())
            .display()
            .to_string()
    }
}

/// Whether the local file is one the platform already treats as
/// compressed (spec §3: "false if already compressed or if size == 0").
pub fn detect_to_compress(path: &Path, size: u64) -> bool {
    if size == 0 {
        return false;
    }
    let guess = mime_guess::from_path(path).first_or_octet_stream();
    let already_compressed_mimes = [
        "application/gzip",
        "application/x-gzip",
        "application/zip",
        "application/x-bzip2",
        "application/x-xz",
        "application/x-7z-compressed",
    ];
    !already_compressed_mimes.contains(&guess.essence_str())
}

pub fn mime_type_of(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct FileMutableState {
    pub remote_file_id: Option<String>,
    pub is_remote_file_open: bool,
    pub bytes_uploaded: u64,
    pub failed: bool,
    pub at_least_one_part_done: bool,
    pub closed: bool,
    pub job_id: Option<String>,
}

/// An upload in progress. Owns its `Chunk`s by index (tracked separately
/// in the pipeline as a `Vec<Chunk>`, never as pointers that outlive this
/// struct, per spec §3's ownership rule); mutated by the owning chunk
/// uploads (`bytes_uploaded`) and by the main task (close/state updates).
pub struct UploadFile {
    pub index: usize,
    pub source: LocalSource,
    pub destination: Destination,
    pub mime_type: String,
    pub to_compress: bool,
    pub chunk_size: u64,
    pub wait_on_close: bool,
    pub bytes_uploaded: AtomicU64,
    pub failed: AtomicBool,
    pub at_least_one_part_done: AtomicBool,
    pub state: std::sync::Mutex<FileMutableState>,
}

impl UploadFile {
    pub fn new(
        index: usize,
        source: LocalSource,
        destination: Destination,
        chunk_size: u64,
        wait_on_close: bool,
        force_no_compress: bool,
    ) -> Self {
        let mime_type = mime_type_of(&source.path);
        let to_compress = !force_no_compress && detect_to_compress(&source.path, source.size);
        Self {
            index,
            to_compress,
            mime_type,
            chunk_size,
            wait_on_close,
            bytes_uploaded: AtomicU64::new(0),
            failed: AtomicBool::new(false),
            at_least_one_part_done: AtomicBool::new(false),
            state: std::sync::Mutex::new(FileMutableState::default()),
            source,
            destination,
        }
    }

    /// `remote_name`: `name` with `.gz` appended if this file will be
    /// compressed locally before upload (spec §4.4).
    pub fn remote_name(&self) -> String {
        if self.to_compress {
            format!("{}.gz", self.destination.name)
        } else {
            self.destination.name.clone()
        }
    }

    pub fn fingerprint(&self) -> String {
        crate::fingerprint::fingerprint(
            self.source.size,
            self.source.mtime_unix_secs(),
            self.to_compress,
            self.chunk_size,
            &self.source.canonical_path(),
        )
    }

    pub fn credit_bytes(&self, n: u64) {
        self.bytes_uploaded.fetch_add(n, Ordering::SeqCst);
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn mark_part_done(&self) {
        self.at_least_one_part_done.store(true, Ordering::SeqCst);
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::SeqCst)
    }

    pub fn percent_complete(&self) -> f64 {
        if self.source.size == 0 {
            return if self.at_least_one_part_done.load(Ordering::SeqCst) {
                100.0
            } else {
                0.0
            };
        }
        (self.bytes_uploaded() as f64 / self.source.size as f64) * 100.0
    }
}

/// Validates a user-specified chunk size against the platform minimum
/// (spec §7 `ConfigError::ChunkSizeTooSmall`).
pub fn validate_chunk_size(chunk_size: u64) -> Result<()> {
    if chunk_size < MIN_CHUNK_SIZE {
        return Err(crate::error::ConfigError::ChunkSizeTooSmall(chunk_size).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_name_appends_gz_when_compressing() {
        let mut dest = Destination::default();
        dest.name = "reads.fastq".to_string();
        let source = LocalSource {
            path: PathBuf::from("reads.fastq"),
            size: 100,
            mtime: SystemTime::UNIX_EPOCH,
        };
        let file = UploadFile::new(0, source, dest, MIN_CHUNK_SIZE, false, false);
        if file.to_compress {
            assert_eq!(file.remote_name(), "reads.fastq.gz");
        }
    }

    #[test]
    fn zero_length_file_is_never_marked_to_compress() {
        assert!(!detect_to_compress(Path::new("empty.bin"), 0));
    }
}
