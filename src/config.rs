//! Process-wide configuration, loaded once at startup and frozen.
//!
//! Lookup order per parameter follows spec §4.1: explicit CLI value, then
//! environment variable, then the JSON config file, then the legacy
//! shell-export config file, then a built-in default. Mirrors the
//! teacher's `ObjectConfig`: a plain `Clone` struct built once and handed
//! to workers by reference, validated lazily at first use rather than at
//! construction time.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Special sentinel accepted for `--certificate-file` that disables TLS
/// peer verification entirely.
pub const NOVERIFY: &str = "NOVERIFY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
pub enum ApiProtocol {
    Http,
    #[default]
    Https,
}

impl fmt::Display for ApiProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiProtocol::Http => write!(f, "http"),
            ApiProtocol::Https => write!(f, "https"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CaCert {
    SystemDefault,
    NoVerify,
    File(PathBuf),
}

/// Raw overrides parsed straight from CLI flags. Every field is optional;
/// `Config::load` fills gaps from env, config files, then defaults.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub auth_token: Option<String>,
    pub api_protocol: Option<ApiProtocol>,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub project: Option<String>,
    pub certificate_file: Option<String>,
    pub user_agent_suffix: Option<String>,
    pub libcurl_verbose: bool,
}

/// On-disk JSON config, as read from `~/.dnanexus_config/environment.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct JsonConfigFile {
    #[serde(default)]
    auth_token_type: Option<String>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    api_protocol: Option<String>,
    #[serde(default)]
    api_host: Option<String>,
    #[serde(default)]
    api_port: Option<u16>,
    #[serde(default)]
    project_context_id: Option<String>,
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default)]
    ca_cert: Option<String>,
    #[serde(default)]
    user_agent_suffix: Option<String>,
}

/// Frozen, process-wide configuration snapshot. Cheap to `Clone` (wraps
/// its few owned strings directly); handed to every worker as an
/// `Arc<Config>`, read without locks after `load()` returns.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_protocol: ApiProtocol,
    pub api_host: String,
    pub api_port: u16,
    /// Opaque bearer token. Not validated at load time; `ApiClient`
    /// raises `ConfigError::MissingAuthToken` the first time it needs to
    /// build an `Authorization` header and finds this empty.
    pub auth_token: String,
    pub ca_cert: CaCert,
    pub current_project: Option<String>,
    pub job_id: Option<String>,
    pub workspace_id: Option<String>,
    pub user_agent_suffix: Option<String>,
    pub libcurl_verbose: bool,
}

impl Config {
    pub fn api_base_url(&self) -> String {
        format!("{}://{}:{}", self.api_protocol, self.api_host, self.api_port)
    }

    pub fn user_agent(&self) -> String {
        let base = format!("dx-upload-agent/{}", env!("CARGO_PKG_VERSION"));
        match &self.user_agent_suffix {
            Some(suffix) if !suffix.is_empty() => format!("{base} {suffix}"),
            _ => base,
        }
    }

    pub fn require_auth_token(&self) -> Result<&str, ConfigError> {
        if self.auth_token.is_empty() {
            Err(ConfigError::MissingAuthToken)
        } else {
            Ok(&self.auth_token)
        }
    }

    pub fn require_api_base(&self) -> Result<(), ConfigError> {
        if self.api_host.is_empty() {
            Err(ConfigError::MissingApiBase)
        } else {
            Ok(())
        }
    }

    /// Layered load: CLI overrides, then environment, then the JSON
    /// config file, then the legacy shell-export file, then defaults.
    /// Parse failures on either config file are logged and treated as
    /// "not present" for that source (spec §4.1), never fatal here.
    pub fn load(overrides: CliOverrides) -> Arc<Config> {
        let config_dir = dnanexus_config_dir();
        let json_file = read_json_config(&config_dir.join("environment.json"));
        let legacy_file = read_legacy_config(&config_dir.join("environment"));

        let api_protocol = overrides
            .api_protocol
            .or_else(|| env_protocol("DX_APISERVER_PROTOCOL"))
            .or_else(|| json_file.as_ref().and_then(|j| j.api_protocol.as_deref()).and_then(parse_protocol))
            .or_else(|| legacy_file.get("DX_APISERVER_PROTOCOL").and_then(|v| parse_protocol(v)))
            .unwrap_or_default();

        let api_host = overrides
            .api_host
            .or_else(|| std::env::var("DX_APISERVER_HOST").ok())
            .or_else(|| json_file.as_ref().and_then(|j| j.api_host.clone()))
            .or_else(|| legacy_file.get("DX_APISERVER_HOST").cloned())
            .unwrap_or_else(|| "api.dnanexus.com".to_string());

        let api_port = overrides
            .api_port
            .or_else(|| std::env::var("DX_APISERVER_PORT").ok().and_then(|v| v.parse().ok()))
            .or(json_file.as_ref().and_then(|j| j.api_port))
            .or_else(|| legacy_file.get("DX_APISERVER_PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(443);

        let auth_token = overrides
            .auth_token
            .or_else(security_context_token_from_env)
            .or_else(|| json_file.as_ref().and_then(|j| j.auth_token.clone()))
            .or_else(|| legacy_file.get("DX_SECURITY_CONTEXT").and_then(|v| parse_security_context_token(v)))
            .unwrap_or_default();

        let ca_cert_raw = overrides
            .certificate_file
            .or_else(|| std::env::var("DX_CA_CERT").ok())
            .or_else(|| json_file.as_ref().and_then(|j| j.ca_cert.clone()))
            .or_else(|| legacy_file.get("DX_CA_CERT").cloned());
        let ca_cert = match ca_cert_raw.as_deref() {
            None => CaCert::SystemDefault,
            Some(NOVERIFY) => CaCert::NoVerify,
            Some(path) => CaCert::File(PathBuf::from(path)),
        };

        let current_project = overrides
            .project
            .or_else(|| std::env::var("DX_PROJECT_CONTEXT_ID").ok())
            .or_else(|| json_file.as_ref().and_then(|j| j.project_context_id.clone()))
            .or_else(|| legacy_file.get("DX_PROJECT_CONTEXT_ID").cloned());

        let job_id = std::env::var("DX_JOB_ID").ok();

        let workspace_id = std::env::var("DX_WORKSPACE_ID")
            .ok()
            .or_else(|| json_file.as_ref().and_then(|j| j.workspace_id.clone()))
            .or_else(|| legacy_file.get("DX_WORKSPACE_ID").cloned());

        let user_agent_suffix = overrides
            .user_agent_suffix
            .or_else(|| std::env::var("DX_USER_AGENT_SUFFIX").ok())
            .or_else(|| json_file.as_ref().and_then(|j| j.user_agent_suffix.clone()));

        Arc::new(Config {
            api_protocol,
            api_host,
            api_port,
            auth_token,
            ca_cert,
            current_project,
            job_id,
            workspace_id,
            user_agent_suffix,
            libcurl_verbose: overrides.libcurl_verbose,
        })
    }
}

fn dnanexus_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dnanexus_config")
}

fn read_json_config(path: &Path) -> Option<JsonConfigFile> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse JSON config file, treating as absent");
            None
        }
    }
}

/// Parses `export KEY=VALUE` (optionally quoted) lines from the legacy
/// shell-export config; any other line is ignored. Never fatal: an
/// unreadable or malformed file yields an empty map.
fn read_legacy_config(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(path) else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("export ") else {
            continue;
        };
        let Some((key, value)) = rest.split_once('=') else {
            tracing::debug!(line, "ignoring unparseable legacy config line");
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        map.insert(key.trim().to_string(), value.to_string());
    }
    map
}

fn parse_protocol(s: &str) -> Option<ApiProtocol> {
    match s.to_ascii_lowercase().as_str() {
        "http" => Some(ApiProtocol::Http),
        "https" => Some(ApiProtocol::Https),
        _ => None,
    }
}

fn env_protocol(key: &str) -> Option<ApiProtocol> {
    std::env::var(key).ok().and_then(|v| parse_protocol(&v))
}

/// `DX_SECURITY_CONTEXT` is a JSON object `{"auth_token_type": "Bearer",
/// "auth_token": "..."}`; only the token is relevant here since the
/// header format is fixed.
fn security_context_token_from_env() -> Option<String> {
    let raw = std::env::var("DX_SECURITY_CONTEXT").ok()?;
    parse_security_context_token(&raw)
}

fn parse_security_context_token(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value.get("auth_token")?.as_str().map(|s| s.to_string())
}
