//! Wire DTOs for the narrow `/file/*`, `/project/*`, `/system/*` route
//! surface UA's core needs (spec §6). Generalizes the teacher's
//! per-bucket-key response types (`InitMultipartState`,
//! `MultipartUploadState`, `FinishUploadResponse`, `HeadFileResponse` in
//! the retained reference copy) into this platform's route shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::state::{PartManifestEntry, RemoteFileState};

#[derive(Debug, Serialize)]
pub struct FindProjectsRequest<'a> {
    pub name: &'a str,
    pub level: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct FindProjectsResponse {
    pub results: Vec<ProjectResult>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectResult {
    pub id: String,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DescribeProjectResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewFolderRequest<'a> {
    pub folder: &'a str,
    pub parents: bool,
}

#[derive(Debug, Serialize)]
pub struct FileNewRequest<'a> {
    pub project: &'a str,
    pub folder: &'a str,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<&'a str>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FileNewResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct FileDescribeRequest {
    pub parts: bool,
}

#[derive(Debug, Deserialize)]
pub struct FileDescribeResponse {
    pub id: String,
    pub state: RemoteFileState,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub parts: HashMap<String, PartManifestEntry>,
}

#[derive(Debug, Serialize)]
pub struct FileUploadRequest<'a> {
    pub index: u64,
    pub size: u64,
    pub md5: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct FileUploadResponse {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct FileCloseResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct FindDataObjectsRequest<'a> {
    pub class: &'a str,
    pub properties: HashMap<&'a str, &'a str>,
    pub scope: FindScope<'a>,
    pub visibility: &'a str,
    pub describe: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct FindScope<'a> {
    pub project: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct FindDataObjectsResponse {
    pub results: Vec<DataObjectResult>,
}

#[derive(Debug, Deserialize)]
pub struct DataObjectResult {
    pub id: String,
    pub project: String,
    #[serde(default)]
    pub describe: Option<FileDescribeResponse>,
}

#[derive(Debug, Serialize)]
pub struct GreetRequest<'a> {
    pub client: &'a str,
    pub version: &'a str,
    pub platform: &'a str,
}

#[derive(Debug, Deserialize, Default)]
pub struct GreetResponse {
    #[serde(default)]
    pub update: Option<UpdateAdvisory>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdvisory {
    pub version: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// The server's JSON error envelope, used to fill in `ApiError::message`
/// when a request ultimately fails (spec §4.2).
#[derive(Debug, Deserialize, Default)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
