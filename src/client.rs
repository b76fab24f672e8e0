//! Thin wrapper over `reqwest::Client` carrying the timeout/pool
//! configuration spec §4.6/§5 require. Generalizes the teacher's
//! `HttpClient`/`HttpClientBuilder` (same builder-of-a-builder shape);
//! drops `send_file` (UCloud's single-PUT-under-512MB path) since every
//! upload here goes through the chunk pipeline instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use reqwest::{Certificate, Client, ClientBuilder, Proxy};

use crate::config::CaCert;
use crate::constant::{CONNECT_TIMEOUT_SECS, OVERALL_TIMEOUT_SECS};
use crate::dns::ChunkResolver;

#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    resolver: ChunkResolver,
}

pub struct HttpClientBuilder {
    builder: ClientBuilder,
    resolver: ChunkResolver,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub fn get_client(&self) -> &Client {
        &self.inner
    }

    /// The resolver backing this client's connections. The upload
    /// pipeline pins a chunk's round-robin-picked address here before
    /// issuing its PUT (spec §4.6 step 2) so the lookup actually governs
    /// which address the connection uses.
    pub fn resolver(&self) -> &ChunkResolver {
        &self.resolver
    }

    pub fn into_inner(self) -> Client {
        self.inner
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        let resolver = ChunkResolver::new();
        Self {
            builder: ClientBuilder::new()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(OVERALL_TIMEOUT_SECS))
                .pool_idle_timeout(Duration::from_secs(300))
                .pool_max_idle_per_host(5)
                .http2_prior_knowledge()
                .user_agent(format!("dx-upload-agent/{}", crate::VERSION))
                .dns_resolver(Arc::new(resolver.clone())),
            resolver,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.builder = self.builder.connect_timeout(connect_timeout);
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.builder = self.builder.proxy(proxy);
        self
    }

    pub fn with_pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.builder = self.builder.pool_idle_timeout(pool_idle_timeout);
        self
    }

    /// Applies the CA-cert policy: `SystemDefault` leaves reqwest's
    /// default trust store, `NoVerify` turns off peer verification
    /// entirely (spec §4.1's "NOVERIFY" sentinel), `File(path)` loads and
    /// trusts exactly that certificate.
    pub fn with_ca_cert(mut self, ca_cert: &CaCert) -> Result<Self, Error> {
        match ca_cert {
            CaCert::SystemDefault => {}
            CaCert::NoVerify => {
                self.builder = self.builder.danger_accept_invalid_certs(true);
            }
            CaCert::File(path) => {
                let pem = std::fs::read(path)?;
                let cert = Certificate::from_pem(&pem)?;
                self.builder = self.builder.add_root_certificate(cert);
            }
        }
        Ok(self)
    }

    pub fn build(self) -> Result<HttpClient, Error> {
        Ok(HttpClient {
            inner: self.builder.build()?,
            resolver: self.resolver,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
