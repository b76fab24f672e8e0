//! Upload stage: requests a signed per-part URL, PUTs the chunk bytes
//! against it, and applies spec §4.6's retry policy — decrement
//! `tries_left`, clear the buffer, force a DNS re-resolution, and
//! re-enter the Read queue (so the bytes are re-read rather than
//! re-sent from a stale buffer) until the budget is exhausted, at which
//! point the owning file is marked permanently failed.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use super::Counters;
use crate::api::ApiClient;
use crate::constant::{
    CHUNK_RETRY_BACKOFF_BASE_SECS, CHUNK_RETRY_BACKOFF_CEILING_SECS, LOW_SPEED_MIN_BYTES_PER_SEC,
    LOW_SPEED_WINDOW_SECS,
};
use crate::error::{Result, UploadAgentError};
use crate::model::{BoundedQueue, Chunk, UploadFile};
use crate::throttle::Throttle;

pub struct UploadContext {
    pub upload_queue: Arc<BoundedQueue<Chunk>>,
    pub read_queue: Arc<BoundedQueue<Chunk>>,
    pub files: Arc<Vec<Arc<UploadFile>>>,
    pub api: Arc<ApiClient>,
    pub throttle: Option<Arc<Throttle>>,
    pub counters: Arc<Counters>,
    pub cancel: CancellationToken,
    /// Total per-chunk retry budget (`--tries`), used to derive the
    /// attempt number for the retry backoff formula.
    pub tries: u32,
}

pub async fn worker(ctx: Arc<UploadContext>) {
    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            item = ctx.upload_queue.consume() => item,
        };
        let Some(chunk) = item else { return };
        ctx.upload_one(chunk).await;
        tokio::task::yield_now().await;
    }
}

impl UploadContext {
    async fn upload_one(&self, mut chunk: Chunk) {
        let file = &self.files[chunk.file_index];
        if file.is_failed() {
            chunk.clear_data();
            self.counters.record_failure(chunk);
            return;
        }

        let Some(data) = chunk.data.take() else {
            tracing::error!(file_index = chunk.file_index, part = chunk.part_index, "upload worker received a chunk with no data");
            file.mark_failed();
            self.counters.record_failure(chunk);
            return;
        };

        let file_id = file.state.lock().unwrap().remote_file_id.clone();
        let Some(file_id) = file_id else {
            tracing::error!(file_index = chunk.file_index, "upload attempted before remote file id was assigned");
            file.mark_failed();
            self.counters.record_failure(chunk);
            return;
        };

        if let Some(throttle) = &self.throttle {
            throttle.acquire(data.len() as u64).await;
        }

        let attempt = self.tries.saturating_sub(chunk.tries_left);
        match self.attempt_upload(&file_id, &mut chunk, &data).await {
            Ok(()) => {
                file.credit_bytes(data.len() as u64);
                file.mark_part_done();
                self.counters.record_success();
            }
            Err(e) => {
                tracing::warn!(
                    file_index = chunk.file_index,
                    part = chunk.part_index,
                    tries_left = chunk.tries_left,
                    error = %e,
                    "chunk upload attempt failed"
                );
                if chunk.tries_left <= 1 {
                    file.mark_failed();
                    self.counters.record_failure(chunk);
                } else {
                    chunk.tries_left -= 1;
                    chunk.clear_data();
                    chunk.force_dns_refresh();

                    let delay_secs =
                        (CHUNK_RETRY_BACKOFF_BASE_SECS * 2u64.saturating_pow(attempt)).min(CHUNK_RETRY_BACKOFF_CEILING_SECS);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
                        _ = self.cancel.cancelled() => {}
                    }

                    let _ = self.read_queue.produce(chunk).await;
                }
            }
        }
    }

    async fn attempt_upload(&self, file_id: &str, chunk: &mut Chunk, data: &Bytes) -> Result<()> {
        let md5_hex = crate::util::md5_hex(data.as_ref());
        let upload_url = self
            .api
            .file_upload_url(file_id, chunk.part_index, data.len() as u64, &md5_hex, &self.cancel)
            .await?;

        if chunk.resolved_ip.is_none() {
            match crate::dns::host_and_port(&upload_url.url) {
                Ok(host_port) => {
                    let host = host_port.rsplit_once(':').map(|(h, _)| h).unwrap_or(&host_port).to_string();
                    match crate::dns::resolve_one(&host_port).await {
                        Ok(ip) => {
                            self.api.http().resolver().pin(&host, ip);
                            chunk.resolved_ip = Some(ip);
                            chunk.host_name = Some(host);
                        }
                        Err(e) => {
                            tracing::debug!(host = %host, error = %e, "chunk DNS re-resolution failed, falling back to system resolver");
                        }
                    }
                }
                Err(e) => tracing::debug!(error = %e, "could not extract host from upload URL"),
            }
        }

        let mut headers = HeaderMap::new();
        for (key, value) in &upload_url.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
                headers.insert(name, value);
            }
        }
        // The three headers spec §4.6 step 3 requires the client itself
        // to set, overriding whatever the signed-URL response carried:
        // exact Content-Length, lowercase-hex Content-MD5, and an empty
        // Content-Type (the storage backend is strict about a default
        // `application/x-www-form-urlencoded` reqwest would otherwise add).
        headers.insert(CONTENT_LENGTH, HeaderValue::from_str(&data.len().to_string()).unwrap());
        headers.insert(HeaderName::from_static("content-md5"), HeaderValue::from_str(&md5_hex).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(""));

        let client = self.api.http().get_client().clone();
        let body = data.clone();
        let low_speed_secs = (data.len() as u64 / LOW_SPEED_MIN_BYTES_PER_SEC).max(LOW_SPEED_WINDOW_SECS);

        let send = client.put(&upload_url.url).headers(headers).body(body).send();
        let response = tokio::time::timeout(Duration::from_secs(low_speed_secs), send)
            .await
            .map_err(|_| UploadAgentError::Connection {
                message: format!("chunk upload made no progress for {low_speed_secs}s"),
                underlying: None,
            })?
            .map_err(|e| UploadAgentError::Connection {
                message: e.to_string(),
                underlying: None,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            return Err(UploadAgentError::ChunkUpload {
                file_index: chunk.file_index,
                part_index: chunk.part_index,
                last_response: format!("HTTP {status}: {body_text}"),
            });
        }
        Ok(())
    }
}
