//! Compress stage: gzips chunk bytes for files not already in a
//! compressed format. Non-final parts padded with empty gzip records up
//! to `MIN_COMPRESSED_PART_SIZE` (spec §3) since the platform rejects
//! any non-final part below that size and gzip's ratio can shrink a
//! 5 MiB input well under it.

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio_util::sync::CancellationToken;

use super::Counters;
use crate::constant::MIN_COMPRESSED_PART_SIZE;
use crate::model::{BoundedQueue, Chunk};

pub struct CompressContext {
    pub compress_queue: Arc<BoundedQueue<Chunk>>,
    pub upload_queue: Arc<BoundedQueue<Chunk>>,
    pub counters: Arc<Counters>,
    pub cancel: CancellationToken,
}

pub async fn worker(ctx: Arc<CompressContext>) {
    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            item = ctx.compress_queue.consume() => item,
        };
        let Some(mut chunk) = item else { return };

        let data = chunk.data.take().unwrap_or_default();
        match compress_chunk(&data, chunk.last_chunk) {
            Ok(compressed) => {
                chunk.data = Some(Bytes::from(compressed));
                if ctx.upload_queue.produce(chunk).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(file_index = chunk.file_index, part = chunk.part_index, error = %e, "chunk compression failed");
                ctx.counters.record_failure(chunk);
            }
        }

        tokio::task::yield_now().await;
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn compress_chunk(data: &[u8], last_chunk: bool) -> std::io::Result<Vec<u8>> {
    let compressed = gzip(data)?;
    if last_chunk || compressed.len() as u64 >= MIN_COMPRESSED_PART_SIZE {
        return Ok(compressed);
    }
    pad_with_empty_gzip_records(compressed)
}

/// Appends empty gzip members (each one a valid, independently
/// decodable, zero-byte-payload gzip stream) until the buffer reaches
/// `MIN_COMPRESSED_PART_SIZE`. A gzip decoder concatenates member
/// streams transparently, so this inflates part size without changing
/// decompressed content.
fn pad_with_empty_gzip_records(mut compressed: Vec<u8>) -> std::io::Result<Vec<u8>> {
    let empty_record = gzip(&[])?;
    while (compressed.len() as u64) < MIN_COMPRESSED_PART_SIZE {
        compressed.extend_from_slice(&empty_record);
    }
    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_chunk_is_never_padded() {
        let out = compress_chunk(b"short data", true).unwrap();
        assert!((out.len() as u64) < MIN_COMPRESSED_PART_SIZE);
    }

    #[test]
    fn non_final_chunk_is_padded_to_minimum() {
        let out = compress_chunk(b"short data", false).unwrap();
        assert!((out.len() as u64) >= MIN_COMPRESSED_PART_SIZE);
    }
}
