//! Typed error surface for the upload agent and verifier.
//!
//! Generalizes the teacher SDK's flat `UFileError` into the variant set
//! spec'd for the Upload Agent: each variant carries enough context to
//! produce the user-visible one-line failure message without the caller
//! re-deriving it.

use std::sync::Once;

use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, UploadAgentError>;

#[derive(Debug, Error)]
pub enum UploadAgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error reading {path} at offset {offset}: {source}")]
    SeekRead {
        path: String,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("API error on {route}: {status} {message}")]
    Api {
        route: String,
        status: u16,
        kind: ApiErrorKind,
        message: String,
    },

    #[error("connection error: {message}")]
    Connection {
        message: String,
        underlying: Option<String>,
    },

    #[error("failed to parse response body as JSON: {0}")]
    Parse(String),

    #[error(
        "chunk upload failed permanently for file {file_index} part {part_index}: {last_response}"
    )]
    ChunkUpload {
        file_index: usize,
        part_index: u64,
        last_response: String,
    },

    #[error("resume ambiguity: {0} candidate files share this fingerprint")]
    ResumeAmbiguous(usize),

    #[error("duplicate fingerprint targets the same project: {0}")]
    DuplicateFingerprint(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    InvalidAuthToken,
    PermissionDenied,
    NotFound,
    Ambiguous,
    InvalidInput,
    ServerError,
    Unknown,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::InvalidAuthToken,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            422 | 400 => Self::InvalidInput,
            s if s >= 500 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no auth token configured (set --auth-token, DX_SECURITY_CONTEXT, or a config file)")]
    MissingAuthToken,

    #[error("no API server base URL configured")]
    MissingApiBase,

    #[error("thread count for {stage} must be positive, got {value}")]
    NonPositiveThreadCount { stage: &'static str, value: i64 },

    #[error("chunk size {0} bytes is below the minimum part size of 5 MiB")]
    ChunkSizeTooSmall(u64),

    #[error("throttle {0} bytes/s is below the minimum of 4 KiB/s")]
    ThrottleTooLow(u64),

    #[error(
        "mismatched counts: {projects} project(s), {folders} folder(s), {names} name(s) for {files} file(s)"
    )]
    MismatchedDestinationCounts {
        projects: usize,
        folders: usize,
        names: usize,
        files: usize,
    },

    #[error("--ref-genome requires one of --reads/--paired-reads/--mappings/--variants")]
    RefGenomeWithoutImport,

    #[error("an import flag requires --ref-genome")]
    ImportWithoutRefGenome,

    #[error("--paired-reads requires an even number of files, got {0}")]
    OddPairedReadsCount(usize),

    #[error("failed to parse config file {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Guards the `OutOfMemory` fast path so only the first worker to observe
/// it runs cleanup and prints remediation advice; every other caller's
/// observation is swallowed into a no-op.
static OOM_GUARD: Once = Once::new();

/// Runs `on_first` exactly once across however many threads call this
/// concurrently, then always returns the `OutOfMemory` error to the caller.
pub fn handle_out_of_memory_once(
    detail: impl Into<String>,
    on_first: impl FnOnce(),
) -> UploadAgentError {
    OOM_GUARD.call_once(on_first);
    UploadAgentError::OutOfMemory(detail.into())
}

impl From<serde_json::Error> for UploadAgentError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl UploadAgentError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn seek_read(path: impl Into<String>, offset: u64, source: std::io::Error) -> Self {
        Self::SeekRead {
            path: path.into(),
            offset,
            source,
        }
    }

    /// True when the condition is recognized as always safe to retry per
    /// spec §4.2's always-safe set, independent of the caller's
    /// `safe_to_retry` flag.
    pub fn is_always_safe_to_retry(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
