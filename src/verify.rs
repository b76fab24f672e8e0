//! `dx-verify-file` core (spec §4.8): re-reads a local file against a
//! closed remote file's part manifest without re-uploading anything.
//! Two worker pools — read, then MD5 — each over their own
//! `BoundedQueue`, mirroring the UA pipeline's Read/Upload split but
//! ending in a compare instead of a PUT. The first mismatch for a file
//! short-circuits the rest of that file's chunks.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::error::{Result, UploadAgentError};
use crate::model::{BoundedQueue, PartIndex};
use crate::util::fs::ChunkFile;
use crate::util::md5_hex;

#[derive(Debug)]
pub struct PartMismatch {
    pub part_index: PartIndex,
    pub expected_md5: String,
    pub actual_md5: String,
}

#[derive(Debug)]
pub struct VerifyOutcome {
    pub file_id: String,
    pub mismatches: Vec<PartMismatch>,
}

impl VerifyOutcome {
    pub fn is_match(&self) -> bool {
        self.mismatches.is_empty()
    }
}

struct ReadJob {
    part_index: PartIndex,
    start: u64,
    end: u64,
    expected_md5: String,
}

struct Md5Job {
    part_index: PartIndex,
    data: bytes::Bytes,
    expected_md5: String,
}

pub async fn verify_file(
    api: &Arc<ApiClient>,
    local_path: &Path,
    file_id: &str,
    read_threads: usize,
    md5_threads: usize,
    cancel: &CancellationToken,
) -> Result<VerifyOutcome> {
    let local_size = std::fs::metadata(local_path)
        .map_err(|e| UploadAgentError::io(local_path.display().to_string(), e))?
        .len();

    let describe = api.file_describe(file_id, true, cancel).await?;
    if describe.state != crate::model::RemoteFileState::Closed {
        return Err(UploadAgentError::Other(anyhow::anyhow!(
            "{file_id} is not closed; cannot verify a file still accepting uploads"
        )));
    }

    let remote_size: u64 = describe.parts.values().map(|p| p.size).sum();
    if remote_size != local_size {
        return Ok(VerifyOutcome {
            file_id: file_id.to_string(),
            mismatches: vec![PartMismatch {
                part_index: 0,
                expected_md5: format!("size={remote_size}"),
                actual_md5: format!("size={local_size}"),
            }],
        });
    }

    let mut parts: Vec<(PartIndex, u64, String)> = describe
        .parts
        .iter()
        .filter_map(|(index, entry)| index.parse::<u64>().ok().map(|i| (i, entry.size, entry.md5.clone())))
        .collect();
    parts.sort_by_key(|(index, _, _)| *index);

    let read_queue = Arc::new(BoundedQueue::<ReadJob>::unbounded());
    let md5_queue = Arc::new(BoundedQueue::<Md5Job>::bounded(md5_threads.max(1) * 4));
    let mut offset = 0u64;
    for (part_index, size, expected_md5) in &parts {
        let start = offset;
        let end = offset + size;
        offset = end;
        read_queue
            .produce(ReadJob {
                part_index: *part_index,
                start,
                end,
                expected_md5: expected_md5.clone(),
            })
            .await
            .ok();
    }

    let handle = Arc::new(
        File::open(local_path).map_err(|e| UploadAgentError::io(local_path.display().to_string(), e))?,
    );
    let mismatches = Arc::new(std::sync::Mutex::new(Vec::new()));
    let short_circuit = Arc::new(AtomicBool::new(false));
    let remaining = Arc::new(std::sync::atomic::AtomicUsize::new(parts.len()));

    let mut tasks = Vec::new();
    for _ in 0..read_threads.max(1) {
        let read_queue = read_queue.clone();
        let md5_queue = md5_queue.clone();
        let handle = handle.clone();
        let short_circuit = short_circuit.clone();
        let local_path_str = local_path.display().to_string();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                if short_circuit.load(Ordering::SeqCst) || cancel.is_cancelled() {
                    return;
                }
                let Some(job) = read_queue.consume().await else { return };
                match ChunkFile::read_from(&handle, &local_path_str, job.start, job.end - job.start) {
                    Ok(data) => {
                        let _ = md5_queue
                            .produce(Md5Job {
                                part_index: job.part_index,
                                data: data.into_bytes(),
                                expected_md5: job.expected_md5,
                            })
                            .await;
                    }
                    Err(e) => tracing::error!(part = job.part_index, error = %e, "verify read failed"),
                }
            }
        }));
    }

    for _ in 0..md5_threads.max(1) {
        let md5_queue = md5_queue.clone();
        let mismatches = mismatches.clone();
        let short_circuit = short_circuit.clone();
        let remaining = remaining.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                let Some(job) = md5_queue.consume().await else { return };
                let actual = md5_hex(job.data.as_ref());
                if actual != job.expected_md5 {
                    short_circuit.store(true, Ordering::SeqCst);
                    mismatches.lock().unwrap().push(PartMismatch {
                        part_index: job.part_index,
                        expected_md5: job.expected_md5,
                        actual_md5: actual,
                    });
                }
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    return;
                }
            }
        }));
    }

    for task in tasks {
        task.await.ok();
    }

    let mismatches = Arc::try_unwrap(mismatches).map(|m| m.into_inner().unwrap()).unwrap_or_default();

    Ok(VerifyOutcome {
        file_id: file_id.to_string(),
        mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_mismatch_is_reported_as_part_zero() {
        let mismatch = PartMismatch {
            part_index: 0,
            expected_md5: "size=10".to_string(),
            actual_md5: "size=5".to_string(),
        };
        assert_eq!(mismatch.part_index, 0);
    }
}
