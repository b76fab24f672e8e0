/// Minimum part size accepted by the platform for any non-final part;
/// also the default chunk size when `--chunk-size` is not given.
pub const MIN_CHUNK_SIZE: u64 = 5 << 20;

/// Minimum part size the platform will accept after gzip compression for
/// a non-final part; compressed parts below this are padded (spec §3).
pub const MIN_COMPRESSED_PART_SIZE: u64 = 5 << 20;

/// Minimum throttle rate accepted by `--throttle` (spec §7 ConfigError).
pub const MIN_THROTTLE_BYTES_PER_SEC: u64 = 4 << 10;

/// Read-stage local I/O buffer granularity.
pub const DEFAULT_BUFFER_SIZE: usize = 512 << 10;

/// Default per-chunk retry budget (spec §4.6).
pub const DEFAULT_TRIES: u32 = 3;

/// Chunk upload retry backoff: `min(CEILING, BASE * 2^attempt)` seconds
/// (spec §4.6).
pub const CHUNK_RETRY_BACKOFF_BASE_SECS: u64 = 4;
pub const CHUNK_RETRY_BACKOFF_CEILING_SECS: u64 = 256;

/// Default number of completion repair passes (spec §4.7).
pub const NUM_CHUNK_CHECKS: u32 = 3;

/// Size of the rolling instantaneous-throughput window (spec §4.6).
pub const THROUGHPUT_WINDOW_CAPACITY: usize = 5000;

/// Age at which the rolling throughput window head is considered stale
/// and reset (spec §4.6).
pub const THROUGHPUT_WINDOW_MAX_AGE_SECS: u64 = 90;

/// Connect / overall / low-speed timeouts (spec §4.6, §5).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
pub const OVERALL_TIMEOUT_SECS: u64 = 1800;
pub const LOW_SPEED_WINDOW_SECS: u64 = 60;
pub const LOW_SPEED_MIN_BYTES_PER_SEC: u64 = 1;

/// Default `Retry-After` delay when a 503 omits the header (spec §4.2).
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// API client retry budget and base backoff (spec §4.2).
pub const API_MAX_RETRIES: u32 = 5;
pub const API_BASE_BACKOFF_SECS: u64 = 2;

/// Memory governor backoff ceiling (spec §4.9).
pub const MEMORY_BACKOFF_CEILING_SECS: u64 = 16;

/// Fraction of available system memory the governor allows the process
/// to approach before throttling reads (spec §4.9).
pub const MEMORY_LIMIT_FRACTION: f64 = 0.8;

/// Resume fingerprint property name (spec §3).
pub const FINGERPRINT_PROPERTY: &str = ".system-fileSignature";
