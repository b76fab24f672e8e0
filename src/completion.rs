//! Completion & close (spec §4.7): after the pipeline drains, re-query
//! each file's part manifest and re-run the chunk upload for any part
//! the server doesn't yet report `complete`, up to `NUM_CHUNK_CHECKS`
//! repair passes, then close.
//!
//! Each pass gets its own fresh per-pass chunk-repair count; permanent
//! failures accumulate cumulatively across passes in a separate set
//! that is never reset between passes (an explicit resolution of the
//! `totalChunks` reuse ambiguity — see DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::constant::NUM_CHUNK_CHECKS;
use crate::error::Result;
use crate::memory::MemoryGovernor;
use crate::model::{chunk_range, Chunk, RemoteFileState, UploadFile};
use crate::pipeline::{self, PipelineConfig};

pub struct CompletionOutcome {
    pub closed_file_ids: Vec<String>,
    pub permanently_failed: Vec<Chunk>,
}

/// Runs the repair loop for one already-pipelined file, then closes it.
/// `wait_on_close` blocks (polling every ~1s) until the server reports
/// the file's state as `closed`, rather than returning as soon as the
/// close request is accepted.
pub async fn complete_and_close(
    api: &Arc<ApiClient>,
    memory: &Arc<MemoryGovernor>,
    file: Arc<UploadFile>,
    file_id: String,
    base_pipeline_config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<CompletionOutcome> {
    let mut permanently_failed = Vec::new();

    for pass in 1..=NUM_CHUNK_CHECKS {
        if cancel.is_cancelled() {
            break;
        }
        let describe = api.file_describe(&file_id, true, cancel).await?;
        let incomplete: Vec<_> = describe
            .parts
            .iter()
            .filter(|(_, entry)| !entry.state.is_complete())
            .map(|(index, _)| index.parse::<u64>().unwrap_or(0))
            .filter(|i| *i > 0)
            .collect();

        if incomplete.is_empty() {
            break;
        }

        tracing::info!(file_id = %file_id, pass, incomplete = incomplete.len(), "completion repair pass");

        let repair_chunks: Vec<Chunk> = incomplete
            .iter()
            .map(|&part_index| {
                let (start, end, last_chunk) = chunk_range(file.source.size, file.chunk_size, part_index);
                Chunk::new(file.index, part_index, start, end, last_chunk, base_pipeline_config.tries)
            })
            .collect();

        let outcome = pipeline::run_chunks(
            vec![file.clone()],
            repair_chunks,
            api.clone(),
            memory.clone(),
            PipelineConfig {
                read_threads: base_pipeline_config.read_threads,
                compress_threads: base_pipeline_config.compress_threads,
                upload_threads: base_pipeline_config.upload_threads,
                compress_queue_capacity: base_pipeline_config.compress_queue_capacity,
                upload_queue_capacity: base_pipeline_config.upload_queue_capacity,
                tries: base_pipeline_config.tries,
                throttle_bytes_per_sec: base_pipeline_config.throttle_bytes_per_sec,
            },
            cancel.clone(),
        )
        .await?;

        // This pass's own failure count does not persist into the next
        // pass's completion check, but every chunk that exhausts its
        // retry budget here is permanent regardless of which pass found
        // it, so it is folded into the cumulative set immediately.
        permanently_failed.extend(outcome.permanently_failed);
    }

    let close_response = api.file_close(&file_id, cancel).await?;

    if file.wait_on_close {
        loop {
            let describe = api.file_describe(&close_response.id, false, cancel).await?;
            if describe.state == RemoteFileState::Closed {
                break;
            }
            tokio::select! {
                _ = sleep(Duration::from_secs(1)) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }

    Ok(CompletionOutcome {
        closed_file_ids: vec![close_response.id],
        permanently_failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_chunk_checks_is_bounded() {
        assert!(NUM_CHUNK_CHECKS >= 1);
    }
}
