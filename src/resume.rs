//! Resume lookup: given a fingerprint, finds whether a matching remote
//! file already exists, is already closed (nothing to do), is still
//! open and partially uploaded (resume it), or matches more than one
//! remote file (ambiguous, refuse to guess) — spec §4.4's matrix.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::model::FileDescribeResponse;
use crate::api::ApiClient;
use crate::constant::FINGERPRINT_PROPERTY;
use crate::error::{Result, UploadAgentError};
use crate::model::RemoteFileState;

#[derive(Debug)]
pub enum ResumeOutcome {
    New,
    AlreadyComplete { file_id: String },
    Resume {
        file_id: String,
        manifest: HashMap<String, crate::model::PartManifestEntry>,
    },
    Ambiguous { file_ids: Vec<String> },
}

/// Looks up every file in `project` tagged with this fingerprint. Per
/// spec §4.4: zero matches means upload as new; exactly one open match
/// means resume it; exactly one closed match means it's already done;
/// more than one match of either state is ambiguous and the caller must
/// not guess which to resume.
pub async fn find_target(
    api: &Arc<ApiClient>,
    project: &str,
    fingerprint: &str,
    cancel: &CancellationToken,
) -> Result<ResumeOutcome> {
    let found = api
        .find_data_objects_by_fingerprint(project, FINGERPRINT_PROPERTY, fingerprint, cancel)
        .await?;

    let mut describes: Vec<(String, FileDescribeResponse)> = Vec::new();
    for result in found.results {
        let describe = match result.describe {
            Some(d) => d,
            None => api.file_describe(&result.id, true, cancel).await?,
        };
        describes.push((result.id, describe));
    }

    let closed: Vec<_> = describes.iter().filter(|(_, d)| d.state == RemoteFileState::Closed).collect();
    let open: Vec<_> = describes
        .iter()
        .filter(|(_, d)| !matches!(d.state, RemoteFileState::Closed))
        .collect();

    if describes.is_empty() {
        return Ok(ResumeOutcome::New);
    }
    if closed.len() > 1 || open.len() > 1 || (!closed.is_empty() && !open.is_empty()) {
        return Ok(ResumeOutcome::Ambiguous {
            file_ids: describes.into_iter().map(|(id, _)| id).collect(),
        });
    }
    if let Some((id, _)) = closed.first() {
        return Ok(ResumeOutcome::AlreadyComplete { file_id: id.clone() });
    }
    if let Some((id, describe)) = open.first() {
        return Ok(ResumeOutcome::Resume {
            file_id: id.clone(),
            manifest: describe.parts.clone(),
        });
    }

    Err(UploadAgentError::Other(anyhow::anyhow!(
        "resume lookup returned an unreachable state for fingerprint {fingerprint}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PartState;

    fn describe(state: RemoteFileState) -> FileDescribeResponse {
        FileDescribeResponse {
            id: "file-x".to_string(),
            state,
            size: 0,
            properties: HashMap::new(),
            parts: HashMap::new(),
        }
    }

    #[test]
    fn closed_and_open_together_is_ambiguous() {
        let describes = vec![
            ("file-a".to_string(), describe(RemoteFileState::Closed)),
            ("file-b".to_string(), describe(RemoteFileState::Open)),
        ];
        let closed: Vec<_> = describes.iter().filter(|(_, d)| d.state == RemoteFileState::Closed).collect();
        let open: Vec<_> = describes.iter().filter(|(_, d)| !matches!(d.state, RemoteFileState::Closed)).collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(open.len(), 1);
        assert!(!closed.is_empty() && !open.is_empty());
    }

    #[test]
    fn part_state_reflects_completion() {
        assert!(PartState::Complete.is_complete());
        assert!(!PartState::Pending.is_complete());
    }
}
