//! Request authorization headers.
//!
//! The teacher SDK signs every request with HMAC-SHA1 over a canonical
//! string (UCloud's per-bucket-key scheme, see `ObjectOptAuthParam` in the
//! retained reference copy under `src/api/object.rs`). The platform this
//! crate talks to instead uses a static opaque bearer token, so
//! `AuthorizationService` is generalized from a signer into a
//! constant-header builder; the one-method-per-request shape is kept.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::Config;
use crate::error::{ConfigError, Result, UploadAgentError};

pub const API_VERSION: &str = "1.0.0";

/// Builds the mandatory `Authorization`, `DNAnexus-API`, and `User-Agent`
/// headers shared by every API request.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationService;

impl AuthorizationService {
    pub fn mandatory_headers(&self, config: &Config) -> Result<HeaderMap> {
        let token = config
            .require_auth_token()
            .map_err(UploadAgentError::Config)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                UploadAgentError::Config(ConfigError::Other(anyhow::anyhow!(
                    "auth token is not a valid header value: {e}"
                )))
            })?,
        );
        headers.insert(
            HeaderName::from_static("dnanexus-api"),
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent())
                .unwrap_or_else(|_| HeaderValue::from_static("dx-upload-agent")),
        );
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;

    #[test]
    fn builds_bearer_header() {
        let config = Config::load(CliOverrides {
            auth_token: Some("secret-token".to_string()),
            ..Default::default()
        });
        let headers = AuthorizationService.mandatory_headers(&config).unwrap();
        assert_eq!(
            headers.get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer secret-token"
        );
        assert_eq!(headers.get("dnanexus-api").unwrap(), API_VERSION);
    }

    #[test]
    fn missing_token_is_fatal_at_first_use() {
        let config = Config::load(CliOverrides::default());
        let err = AuthorizationService.mandatory_headers(&config).unwrap_err();
        assert!(matches!(
            err,
            UploadAgentError::Config(ConfigError::MissingAuthToken)
        ));
    }
}
