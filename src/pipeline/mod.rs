//! Wires the three pipeline stages together (spec §4.5): an unbounded
//! Read queue fed with every chunk of every file up front, a bounded
//! Compress queue, and a bounded Upload queue. Worker counts and queue
//! capacities come from `PipelineConfig`; completion is detected by
//! counting rather than by closing channels, since every stage shares
//! its queue via `Arc` (see `model::queue`) rather than handing out
//! senders that could be dropped to signal EOF.

pub mod compress;
pub mod monitor;
pub mod progress;
pub mod read;
pub mod upload;

use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::error::{Result, UploadAgentError};
use crate::memory::MemoryGovernor;
use crate::model::{enumerate_chunks, BoundedQueue, Chunk, UploadFile};
use crate::throttle::Throttle;

pub struct PipelineConfig {
    pub read_threads: usize,
    pub compress_threads: usize,
    pub upload_threads: usize,
    pub compress_queue_capacity: usize,
    pub upload_queue_capacity: usize,
    pub tries: u32,
    pub throttle_bytes_per_sec: Option<u64>,
}

/// Tracks how many of `total` chunks have finished one way or another.
/// The monitor task polls `is_done` instead of relying on a channel
/// closing, since every queue here is shared by `Arc`, not handed out
/// as disposable sender clones.
pub struct Counters {
    total: usize,
    completed: AtomicUsize,
    permanently_failed: Mutex<Vec<Chunk>>,
}

impl Counters {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            permanently_failed: Mutex::new(Vec::new()),
        }
    }

    pub fn record_success(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self, chunk: Chunk) {
        self.permanently_failed.lock().unwrap().push(chunk);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> usize {
        self.permanently_failed.lock().unwrap().len()
    }

    pub fn is_done(&self) -> bool {
        self.completed() + self.failed_count() >= self.total
    }

    pub fn into_failures(self) -> Vec<Chunk> {
        self.permanently_failed.into_inner().unwrap()
    }
}

pub struct PipelineOutcome {
    pub permanently_failed: Vec<Chunk>,
}

/// Drives every file's chunks through Read -> [Compress] -> Upload,
/// returning once every chunk has either uploaded successfully or
/// exhausted its retry budget. Enumerates every chunk of every file
/// itself; see `run_chunks` for the completion repair pass, which
/// instead supplies a specific subset of chunks to re-run.
pub async fn run(
    files: Vec<Arc<UploadFile>>,
    api: Arc<ApiClient>,
    memory: Arc<MemoryGovernor>,
    pipeline_config: PipelineConfig,
    cancel: CancellationToken,
) -> Result<PipelineOutcome> {
    let mut chunks = Vec::new();
    for file in &files {
        chunks.extend(enumerate_chunks(file.index, file.source.size, file.chunk_size, pipeline_config.tries));
    }
    run_chunks(files, chunks, api, memory, pipeline_config, cancel).await
}

/// Core pipeline driver over an explicit chunk list, so callers that
/// already know exactly which parts need (re-)uploading — the
/// completion repair pass — don't have to re-derive it by re-deriving
/// "incomplete" from a freshly enumerated full set.
pub async fn run_chunks(
    files: Vec<Arc<UploadFile>>,
    chunks: Vec<Chunk>,
    api: Arc<ApiClient>,
    memory: Arc<MemoryGovernor>,
    pipeline_config: PipelineConfig,
    cancel: CancellationToken,
) -> Result<PipelineOutcome> {
    let read_queue = Arc::new(BoundedQueue::<Chunk>::unbounded());
    let compress_queue = Arc::new(BoundedQueue::<Chunk>::bounded(pipeline_config.compress_queue_capacity));
    let upload_queue = Arc::new(BoundedQueue::<Chunk>::bounded(pipeline_config.upload_queue_capacity));
    let throttle = pipeline_config.throttle_bytes_per_sec.map(|r| Arc::new(Throttle::new(r)));

    let mut handles = Vec::with_capacity(files.len());
    for file in &files {
        let handle = File::open(&file.source.path)
            .map_err(|e| UploadAgentError::io(file.source.path.display().to_string(), e))?;
        handles.push(Arc::new(handle));
    }
    let total_chunks = chunks.len();
    for chunk in chunks {
        read_queue.produce(chunk).await.ok();
    }

    let counters = Arc::new(Counters::new(total_chunks));
    let files = Arc::new(files);
    let handles = Arc::new(handles);

    let read_ctx = Arc::new(read::ReadContext {
        read_queue: read_queue.clone(),
        compress_queue: compress_queue.clone(),
        upload_queue: upload_queue.clone(),
        files: files.clone(),
        handles: handles.clone(),
        memory,
        counters: counters.clone(),
        cancel: cancel.clone(),
    });
    let compress_ctx = Arc::new(compress::CompressContext {
        compress_queue: compress_queue.clone(),
        upload_queue: upload_queue.clone(),
        counters: counters.clone(),
        cancel: cancel.clone(),
    });
    let upload_ctx = Arc::new(upload::UploadContext {
        upload_queue: upload_queue.clone(),
        read_queue: read_queue.clone(),
        files: files.clone(),
        api,
        throttle,
        counters: counters.clone(),
        cancel: cancel.clone(),
        tries: pipeline_config.tries,
    });

    let mut tasks = Vec::new();
    for _ in 0..pipeline_config.read_threads.max(1) {
        let ctx = read_ctx.clone();
        tasks.push(tokio::spawn(async move { read::worker(ctx).await }));
    }
    for _ in 0..pipeline_config.compress_threads.max(1) {
        let ctx = compress_ctx.clone();
        tasks.push(tokio::spawn(async move { compress::worker(ctx).await }));
    }
    for _ in 0..pipeline_config.upload_threads.max(1) {
        let ctx = upload_ctx.clone();
        tasks.push(tokio::spawn(async move { upload::worker(ctx).await }));
    }

    let monitor_handle = tokio::spawn(monitor::run(counters.clone(), cancel.clone()));

    for task in tasks {
        task.await.ok();
    }
    cancel.cancel();
    monitor_handle.await.ok();

    let counters = Arc::try_unwrap(counters).unwrap_or_else(|arc| Counters {
        total: arc.total,
        completed: AtomicUsize::new(arc.completed()),
        permanently_failed: Mutex::new(arc.permanently_failed.lock().unwrap().clone()),
    });

    Ok(PipelineOutcome {
        permanently_failed: counters.into_failures(),
    })
}
