//! Typed wrappers over `ApiClient::request` for the handful of routes UA
//! and the verifier need (spec §6's route surface). Each wrapper decides
//! its own `safe_to_retry`: GETs-by-another-name (`describe`, `find*`)
//! are idempotent and always safe; `new`/`newFolder` are not retried
//! blindly since a dropped response after a successful create would
//! otherwise risk creating the object twice.

use std::collections::HashMap;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::client::ApiClient;
use crate::api::model::*;
use crate::error::Result;

impl ApiClient {
    pub async fn find_projects(&self, name: &str, level: &str, cancel: &CancellationToken) -> Result<FindProjectsResponse> {
        let body = serde_json::to_value(FindProjectsRequest { name, level })?;
        let value = self.request("system/findProjects", &body, true, None, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn describe_project(&self, project: &str, cancel: &CancellationToken) -> Result<DescribeProjectResponse> {
        let route = format!("{project}/describe");
        let value = self.request(&route, &json!({}), true, None, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Always safe to retry: creating the same folder twice is a no-op
    /// given `parents: true` (DNAnexus folders have no uniqueness
    /// conflict to trip over), unlike `file_new` below.
    pub async fn new_folder(&self, project: &str, folder: &str, cancel: &CancellationToken) -> Result<()> {
        let route = format!("{project}/newFolder");
        let body = serde_json::to_value(NewFolderRequest { folder, parents: true })?;
        self.request(&route, &body, true, None, cancel).await?;
        Ok(())
    }

    /// Creates the remote file object. Never safe to blindly retry: a
    /// dropped response after a successful create must not result in a
    /// second object (spec §4.2's rationale for per-route
    /// `safe_to_retry`).
    pub async fn file_new(&self, req: &FileNewRequest<'_>, cancel: &CancellationToken) -> Result<FileNewResponse> {
        let body = serde_json::to_value(req)?;
        let value = self.request("file/new", &body, false, None, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn file_describe(&self, file_id: &str, parts: bool, cancel: &CancellationToken) -> Result<FileDescribeResponse> {
        let route = format!("{file_id}/describe");
        let body = serde_json::to_value(FileDescribeRequest { parts })?;
        let value = self.request(&route, &body, true, None, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn file_upload_url(
        &self,
        file_id: &str,
        index: u64,
        size: u64,
        md5_hex: &str,
        cancel: &CancellationToken,
    ) -> Result<FileUploadResponse> {
        let route = format!("{file_id}/upload");
        let body = serde_json::to_value(FileUploadRequest { index, size, md5: md5_hex })?;
        let value = self.request(&route, &body, true, None, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Idempotent on the server side: closing an already-closed or
    /// already-closing file is a no-op success, so this is always safe
    /// to retry (spec §4.7).
    pub async fn file_close(&self, file_id: &str, cancel: &CancellationToken) -> Result<FileCloseResponse> {
        let route = format!("{file_id}/close");
        let value = self.request(&route, &json!({}), true, None, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn find_data_objects_by_fingerprint(
        &self,
        project: &str,
        fingerprint_property: &str,
        fingerprint: &str,
        cancel: &CancellationToken,
    ) -> Result<FindDataObjectsResponse> {
        let mut properties = HashMap::new();
        properties.insert(fingerprint_property, fingerprint);
        let req = FindDataObjectsRequest {
            class: "file",
            properties,
            scope: FindScope { project },
            visibility: "either",
            describe: json!({"fields": {"name": true, "state": true, "size": true, "parts": true, "properties": true}}),
        };
        let body = serde_json::to_value(req)?;
        let value = self.request("system/findDataObjects", &body, true, None, cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn greet(&self, client: &str, version: &str, platform: &str, cancel: &CancellationToken) -> Result<GreetResponse> {
        let body = serde_json::to_value(GreetRequest { client, version, platform })?;
        match self.request("system/greet", &body, true, None, cancel).await {
            Ok(value) => Ok(serde_json::from_value(value)?),
            // `greet` is advisory only; a server that doesn't support it
            // (or is briefly unreachable) must not block the upload.
            Err(_) => Ok(GreetResponse::default()),
        }
    }
}
