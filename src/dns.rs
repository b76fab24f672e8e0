//! Host extraction and round-robin resolution for chunk upload URLs
//! (spec §4.6). The platform's signed upload URLs may point at a
//! load-balanced hostname; resolving once and picking an address
//! ourselves lets a failed chunk retry against a different address
//! instead of whatever the OS resolver cached.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;
use rand::seq::SliceRandom;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

use crate::error::{Result, UploadAgentError};

/// Extracts the `host[:port]` portion of a URL for `lookup_host`.
pub fn host_and_port(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| {
        UploadAgentError::Other(anyhow::anyhow!("invalid upload URL {url:?}: {e}"))
    })?;
    let host = parsed
        .host_str()
        .ok_or_else(|| UploadAgentError::Other(anyhow::anyhow!("upload URL has no host: {url:?}")))?;
    let port = parsed.port_or_known_default().unwrap_or(443);
    Ok(format!("{host}:{port}"))
}

/// Resolves `host:port` and picks one address at random among the
/// results, so repeated retries spread load across a round-robin DNS
/// entry instead of always hitting the first address returned.
pub async fn resolve_one(host_port: &str) -> Result<IpAddr> {
    let mut addrs: Vec<_> = tokio::net::lookup_host(host_port)
        .await
        .map_err(|e| UploadAgentError::io(host_port.to_string(), e))?
        .map(|a| a.ip())
        .collect();
    addrs.shuffle(&mut rand::thread_rng());
    addrs
        .into_iter()
        .next()
        .ok_or_else(|| UploadAgentError::Other(anyhow::anyhow!("DNS returned no addresses for {host_port}")))
}

/// A `reqwest::dns::Resolve` that lets the upload pipeline pin a
/// hostname to the specific address `resolve_one` chose, so the round
/// robin pick actually governs which address the chunk PUT connects to
/// instead of being thrown away after the lookup (spec §4.6 step 2).
/// Falls back to the system resolver for any host that hasn't been
/// pinned (every non-upload request).
#[derive(Clone, Default)]
pub struct ChunkResolver {
    pinned: Arc<DashMap<String, IpAddr>>,
}

impl ChunkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the address a chunk's upload should connect to for
    /// `host`. Port is supplied by reqwest's connector from the request
    /// URI, not from this cache, mirroring how the system resolver's
    /// `Addrs` are consumed.
    pub fn pin(&self, host: &str, addr: IpAddr) {
        self.pinned.insert(host.to_string(), addr);
    }
}

impl Resolve for ChunkResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let pinned = self.pinned.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            if let Some(addr) = pinned.get(&host) {
                let addrs: Addrs = Box::new(std::iter::once(SocketAddr::new(*addr, 0)));
                return Ok(addrs);
            }
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            Ok(Box::new(addrs) as Addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_port_defaults_to_443() {
        let hp = host_and_port("https://upload.example.com/abc?sig=1").unwrap();
        assert_eq!(hp, "upload.example.com:443");
    }

    #[test]
    fn host_and_port_respects_explicit_port() {
        let hp = host_and_port("http://upload.example.com:8080/abc").unwrap();
        assert_eq!(hp, "upload.example.com:8080");
    }
}
