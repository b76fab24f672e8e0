//! `ApiClient::request` is the single entry point every route call goes
//! through, implementing the retry table from spec §4.2 via the
//! centralized combinator in `api::retry`. Generalizes the teacher's
//! per-operation HTTP calls (`multipart_init.rs`, `multipart_file.rs`,
//! ...) into one method plus a set of typed route wrappers in
//! `api::routes`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::model::ErrorEnvelope;
use crate::api::retry::{retry_with_backoff, Decision};
use crate::auth::AuthorizationService;
use crate::client::HttpClient;
use crate::config::Config;
use crate::constant::{API_BASE_BACKOFF_SECS, API_MAX_RETRIES, DEFAULT_RETRY_AFTER_SECS};
use crate::error::{ApiErrorKind, Result, UploadAgentError};

pub struct ApiClient {
    http: HttpClient,
    config: Arc<Config>,
    auth: AuthorizationService,
}

#[derive(Debug)]
enum AttemptError {
    Transport { message: String, always_safe: bool },
    Status { status: u16, body: Option<Value>, content_length_mismatch: bool },
    ParseFailure { status: u16 },
    RetryAfter(u64),
}

impl ApiClient {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = HttpClient::builder().with_ca_cert(&config.ca_cert)?.build()?;
        Ok(Self {
            http,
            config,
            auth: AuthorizationService,
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Performs one authenticated, retried request against `route`
    /// (e.g. `"file-xxxx/describe"`). `safe_to_retry` gates whether a
    /// non-idempotent call is retried on ambiguous failures, exactly as
    /// spec §4.2 describes.
    pub async fn request(
        &self,
        route: &str,
        body: &Value,
        safe_to_retry: bool,
        extra_headers: Option<HeaderMap>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.config.require_api_base().map_err(UploadAgentError::Config)?;
        let url = format!("{}/{route}", self.config.api_base_url());

        let result = retry_with_backoff(
            // `retry_with_backoff` counts total attempts, so the retry
            // budget itself needs the +1 for the initial attempt (spec
            // §4.2: "at most 5 retries" means up to 6 attempts total).
            API_MAX_RETRIES + 1,
            Duration::from_secs(API_BASE_BACKOFF_SECS),
            cancel,
            || self.attempt(&url, body, extra_headers.clone()),
            |e| classify(e, safe_to_retry),
        )
        .await;

        result.map_err(|e| self.finalize_error(route, e))
    }

    async fn attempt(&self, url: &str, body: &Value, extra_headers: Option<HeaderMap>) -> Result<Value, AttemptError> {
        let mut headers = self.auth.mandatory_headers(&self.config).map_err(|e| AttemptError::Transport {
            message: e.to_string(),
            always_safe: false,
        })?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            );
        }

        let response = self
            .http
            .get_client()
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await;
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return Err(AttemptError::Transport {
                    always_safe: is_always_safe_transport_error(&e),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status.as_u16() == 503 {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(AttemptError::RetryAfter(retry_after));
        }

        let declared_len = response.content_length();
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                // Body read failed after headers arrived: "connection
                // dropped before a known-good Content-Length" is in the
                // always-safe set per spec §4.2.
                return Err(AttemptError::Transport {
                    message: e.to_string(),
                    always_safe: true,
                });
            }
        };

        if status.is_success() {
            match declared_len {
                Some(len) if len != bytes.len() as u64 => Err(AttemptError::Status {
                    status: status.as_u16(),
                    body: serde_json::from_slice(&bytes).ok(),
                    content_length_mismatch: true,
                }),
                _ => serde_json::from_slice(&bytes).map_err(|_| AttemptError::ParseFailure {
                    status: status.as_u16(),
                }),
            }
        } else {
            Err(AttemptError::Status {
                status: status.as_u16(),
                body: serde_json::from_slice(&bytes).ok(),
                content_length_mismatch: false,
            })
        }
    }

    fn finalize_error(&self, route: &str, e: AttemptError) -> UploadAgentError {
        match e {
            AttemptError::Transport { message, .. } => UploadAgentError::Connection {
                message,
                underlying: None,
            },
            AttemptError::RetryAfter(_) => UploadAgentError::Connection {
                message: "exhausted retries while server kept returning 503".to_string(),
                underlying: None,
            },
            AttemptError::ParseFailure { status } => {
                UploadAgentError::Parse(format!("HTTP {status} response body was not valid JSON"))
            }
            AttemptError::Status { status, body, .. } => {
                let message = body
                    .and_then(|v| serde_json::from_value::<ErrorEnvelope>(v).ok())
                    .and_then(|e| e.error)
                    .and_then(|d| d.message)
                    .unwrap_or_else(|| format!("HTTP {status}"));
                let kind = ApiErrorKind::from_status(status);
                let message = if kind == ApiErrorKind::InvalidAuthToken {
                    format!("invalid auth token: {message} (check --auth-token or DX_SECURITY_CONTEXT)")
                } else {
                    message
                };
                UploadAgentError::Api {
                    route: route.to_string(),
                    status,
                    kind,
                    message,
                }
            }
        }
    }
}

fn classify(e: &AttemptError, safe_to_retry: bool) -> Decision {
    match e {
        AttemptError::RetryAfter(secs) => Decision::RetryAfter(*secs),
        AttemptError::ParseFailure { .. } => Decision::Retry,
        AttemptError::Transport { always_safe, .. } => {
            if *always_safe || safe_to_retry {
                Decision::Retry
            } else {
                Decision::Fatal
            }
        }
        AttemptError::Status {
            status,
            content_length_mismatch,
            ..
        } => {
            let retryable = *status >= 500 || *content_length_mismatch;
            if retryable && safe_to_retry {
                Decision::Retry
            } else {
                Decision::Fatal
            }
        }
    }
}

fn is_always_safe_transport_error(e: &reqwest::Error) -> bool {
    // Connection not established, TLS setup failure, or DNS failure all
    // surface as `is_connect()`; request-build-time failures that never
    // reached the wire are similarly safe to retry unconditionally.
    e.is_connect() || e.is_timeout() || (e.is_request() && !e.is_body())
}
