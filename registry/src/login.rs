//! Login-capable registry client.
//!
//! Scoped to one registry host and namespace. Unlike the base resolver,
//! construction is strict: a credential store that cannot be read is an error.

use std::path::PathBuf;
use std::sync::Arc;

use oci_distribution::RegistryOperation;
use skiff_core::config::is_explicit_credentials;
use skiff_core::error::{Result, SkiffError};

use crate::auth::{CredentialSource, StaticCredentials};
use crate::credentials::CredentialStore;
use crate::reference::ImageReference;
use crate::resolver::OciResolver;
use crate::transport::TransportConfig;

/// Options for [`LoginClient::new`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginOptions {
    hostname: Option<String>,
    username: Option<String>,
    secret: Option<String>,
    user_agent: Option<String>,
    insecure: bool,
    plain_http: bool,
}

impl LoginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log in to `hostname` instead of the client's host.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Skip TLS certificate verification.
    pub fn insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    pub fn plain_http(mut self) -> Self {
        self.plain_http = true;
        self
    }
}

/// Registry client scoped to a host and namespace.
#[derive(Debug)]
pub struct LoginClient {
    host: String,
    namespace: String,
    resolver: Arc<OciResolver>,
}

impl LoginClient {
    /// Build a client for `host`/`namespace`.
    ///
    /// Explicit username or secret in `options` wins; otherwise credentials
    /// come from the store at `config_paths` (default location when empty).
    pub fn new(
        host: &str,
        namespace: &str,
        config_paths: &[PathBuf],
        options: LoginOptions,
    ) -> Result<Self> {
        let host = options
            .hostname
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| host.to_string());
        if host.is_empty() {
            return Err(SkiffError::LoginError {
                registry: host,
                message: "No registry host given".to_string(),
            });
        }

        let username = options.username.clone().unwrap_or_default();
        let secret = options.secret.clone().unwrap_or_default();
        let credentials: Arc<dyn CredentialSource> = if is_explicit_credentials(&username, &secret) {
            Arc::new(StaticCredentials::new(username, secret))
        } else {
            let store = CredentialStore::load(config_paths).map_err(|e| login_error(&host, e))?;
            Arc::new(
                store
                    .credential_source(options.plain_http)
                    .map_err(|e| login_error(&host, e))?,
            )
        };

        let transport = Arc::new(TransportConfig::new(
            options.insecure,
            options.plain_http,
            options.user_agent.clone().unwrap_or_default(),
        ));

        tracing::debug!(
            host = %host,
            namespace = %namespace,
            credentials = %credentials.kind(),
            "Built login client"
        );

        Ok(Self {
            host,
            namespace: namespace.to_string(),
            resolver: Arc::new(OciResolver::new(credentials, transport)),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolver carrying this client's credentials and transport.
    pub fn resolver(&self) -> &Arc<OciResolver> {
        &self.resolver
    }

    /// Check the credentials against the registry by requesting a pull token
    /// for the client's namespace.
    pub async fn login(&self) -> Result<()> {
        let reference = ImageReference::parse(&format!("{}/{}", self.host, self.namespace))?;
        let oci_ref = reference.to_oci_reference()?;
        let auth = self
            .resolver
            .credentials()
            .credentials(&self.host)?
            .to_oci_auth();

        let client = self.resolver.transport().oci_client();
        client
            .auth(&oci_ref, &auth, RegistryOperation::Pull)
            .await
            .map_err(|e| SkiffError::LoginError {
                registry: self.host.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(registry = %self.host, "Login succeeded");
        Ok(())
    }
}

fn login_error(host: &str, err: SkiffError) -> SkiffError {
    SkiffError::LoginError {
        registry: host.to_string(),
        message: err.to_string(),
    }
}
