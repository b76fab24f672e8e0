//! Read stage: pulls a `Chunk` off the Read queue, reads its byte range
//! from disk, and forwards it to Compress (if the owning file is being
//! gzipped) or directly to Upload. Backs off via the memory governor
//! before every read (spec §4.9).

use std::fs::File;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::Counters;
use crate::memory::MemoryGovernor;
use crate::model::{BoundedQueue, Chunk, UploadFile};
use crate::util::fs::ChunkFile;

pub struct ReadContext {
    pub read_queue: Arc<BoundedQueue<Chunk>>,
    pub compress_queue: Arc<BoundedQueue<Chunk>>,
    pub upload_queue: Arc<BoundedQueue<Chunk>>,
    pub files: Arc<Vec<Arc<UploadFile>>>,
    pub handles: Arc<Vec<Arc<File>>>,
    pub memory: Arc<MemoryGovernor>,
    pub counters: Arc<Counters>,
    pub cancel: CancellationToken,
}

pub async fn worker(ctx: Arc<ReadContext>) {
    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            item = ctx.read_queue.consume() => item,
        };
        let Some(mut chunk) = item else { return };

        ctx.memory.wait_if_over_limit(&ctx.cancel).await;
        if ctx.cancel.is_cancelled() {
            return;
        }

        let file = &ctx.files[chunk.file_index];
        if file.is_failed() {
            ctx.counters.record_failure(chunk);
            continue;
        }

        let path = file.source.path.display().to_string();
        match ChunkFile::read_from(&ctx.handles[chunk.file_index], &path, chunk.start, chunk.len()) {
            Ok(data) => {
                chunk.data = Some(data.into_bytes());
                let next = if file.to_compress { &ctx.compress_queue } else { &ctx.upload_queue };
                if next.produce(chunk).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(file_index = chunk.file_index, part = chunk.part_index, error = %e, "chunk read failed");
                file.mark_failed();
                ctx.counters.record_failure(chunk);
            }
        }

        tokio::task::yield_now().await;
    }
}
