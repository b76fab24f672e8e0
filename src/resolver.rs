//! Resolves a user-supplied project spec (ID or name) to a canonical
//! project ID, and ensures a destination folder exists. Memoizes lookups
//! per process so a batch of files destined for the same project/folder
//! only pays for one round trip (spec §4.3).

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::error::{ApiErrorKind, Result, UploadAgentError};

pub struct Resolver {
    api: Arc<ApiClient>,
    project_cache: DashMap<String, String>,
    folder_cache: DashMap<(String, String), ()>,
}

impl Resolver {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            project_cache: DashMap::new(),
            folder_cache: DashMap::new(),
        }
    }

    /// `spec` is either a `project-xxxx` ID (verified via `describe`) or a
    /// project name (resolved via `findProjects`, ambiguous if more than
    /// one match shares that name, per spec §4.3).
    pub async fn resolve_project(&self, spec: &str, cancel: &CancellationToken) -> Result<String> {
        if let Some(id) = self.project_cache.get(spec) {
            return Ok(id.clone());
        }

        let id = if spec.starts_with("project-") {
            match self.api.describe_project(spec, cancel).await {
                Ok(desc) => desc.id,
                Err(UploadAgentError::Api { kind: ApiErrorKind::NotFound, .. }) => {
                    return Err(UploadAgentError::Other(anyhow::anyhow!(
                        "no such project: {spec}"
                    )));
                }
                Err(e) => return Err(e),
            }
        } else {
            let found = self.api.find_projects(spec, "UPLOAD", cancel).await?;
            match found.results.len() {
                0 => {
                    return Err(UploadAgentError::Other(anyhow::anyhow!(
                        "no project named {spec:?} with upload permission"
                    )))
                }
                1 => found.results[0].id.clone(),
                n => {
                    return Err(UploadAgentError::Other(anyhow::anyhow!(
                        "project name {spec:?} is ambiguous: {n} matching projects"
                    )))
                }
            }
        };

        self.project_cache.insert(spec.to_string(), id.clone());
        Ok(id)
    }

    /// Idempotent: a "folder already exists" API error is treated as
    /// success (spec §4.3), and a second call for the same
    /// `(project, folder)` within this process is a no-op.
    pub async fn create_folder(&self, project: &str, folder: &str, cancel: &CancellationToken) -> Result<()> {
        let key = (project.to_string(), folder.to_string());
        if self.folder_cache.contains_key(&key) {
            return Ok(());
        }
        match self.api.new_folder(project, folder, cancel).await {
            Ok(()) => {}
            Err(UploadAgentError::Api { kind: ApiErrorKind::InvalidInput, message, .. })
                if message.to_ascii_lowercase().contains("exist") => {}
            Err(e) => return Err(e),
        }
        self.folder_cache.insert(key, ());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_cache_key_is_project_and_folder() {
        let cache: DashMap<(String, String), ()> = DashMap::new();
        cache.insert(("project-1".to_string(), "/a".to_string()), ());
        assert!(cache.contains_key(&("project-1".to_string(), "/a".to_string())));
        assert!(!cache.contains_key(&("project-1".to_string(), "/b".to_string())));
    }
}
