//! HTTP transport settings for registry clients.
//!
//! A `TransportConfig` is immutable once built. Every protocol client or
//! probe client derived from it is a fresh instance owned by its caller, so
//! two resolvers with different TLS settings never share transport state.

use std::time::Duration;

use oci_distribution::client::{ClientConfig, ClientProtocol};
use skiff_core::config::{default_user_agent, RegistryOptions};
use skiff_core::error::{Result, SkiffError};

/// Connect timeout for probe requests.
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout for probe requests.
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS certificate verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVerification {
    Verify,
    SkipVerify,
}

/// Transport configuration shared by a resolver and everything it builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    tls: TlsVerification,
    plain_http: bool,
    user_agent: String,
}

impl TransportConfig {
    pub fn new(insecure: bool, plain_http: bool, user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        Self {
            tls: if insecure {
                TlsVerification::SkipVerify
            } else {
                TlsVerification::Verify
            },
            plain_http,
            user_agent: if user_agent.is_empty() {
                default_user_agent()
            } else {
                user_agent
            },
        }
    }

    pub fn from_options(opts: &RegistryOptions) -> Self {
        Self::new(opts.insecure, opts.plain_http, opts.effective_user_agent())
    }

    pub fn tls(&self) -> TlsVerification {
        self.tls
    }

    /// True unless certificate verification is skipped.
    pub fn verifies_tls(&self) -> bool {
        self.tls == TlsVerification::Verify
    }

    pub fn plain_http(&self) -> bool {
        self.plain_http
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// URL scheme for registry requests.
    pub fn scheme(&self) -> &'static str {
        if self.plain_http {
            "http"
        } else {
            "https"
        }
    }

    /// Same settings with a different scheme.
    pub fn with_plain_http(&self, plain_http: bool) -> Self {
        Self {
            plain_http,
            ..self.clone()
        }
    }

    /// Fresh protocol client configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            protocol: if self.plain_http {
                ClientProtocol::Http
            } else {
                ClientProtocol::Https
            },
            accept_invalid_certificates: !self.verifies_tls(),
            ..Default::default()
        }
    }

    /// Fresh protocol client.
    pub fn oci_client(&self) -> oci_distribution::Client {
        oci_distribution::Client::new(self.client_config())
    }

    /// Fresh HTTP client for probe requests.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.verifies_tls())
            .user_agent(self.user_agent.clone())
            .connect_timeout(PROBE_CONNECT_TIMEOUT)
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SkiffError::TransportError(format!("Failed to build HTTP client: {}", e)))
    }
}
