//! Registry construction entry points.
//!
//! `new_registry` always yields a usable handle. The discovery and target
//! variants are strict: a bad reference or failed probe is returned to the
//! caller.

use std::sync::Arc;

use async_trait::async_trait;
use skiff_core::config::RegistryOptions;
use skiff_core::error::{Result, SkiffError};

use crate::discovery::{with_discover, ApiVersionProbe, Discoverer, Endpoint};
use crate::login::{LoginClient, LoginOptions};
use crate::reference::ImageReference;
use crate::resolver::{new_resolver, Descriptor, OciResolver, Resolver};
use crate::target::RemoteTarget;
use crate::transport::TransportConfig;

/// Which resolver a registry handle is using.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    /// The base resolver, with no discovery layer.
    BaseResolverActive,
    /// A discovery resolver bound to the probed endpoint.
    DiscoveredResolverActive(Endpoint),
}

/// Registry handle used for all protocol operations.
pub struct Registry {
    resolver: Arc<dyn Resolver>,
    transport: Arc<TransportConfig>,
    warnings: Vec<String>,
    state: RegistryState,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("transport", &self.transport)
            .field("warnings", &self.warnings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Registry {
    fn from_base(base: Arc<OciResolver>) -> Self {
        Self {
            transport: base.transport().clone(),
            warnings: base.warnings().to_vec(),
            resolver: base,
            state: RegistryState::BaseResolverActive,
        }
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    /// Soft credential failures met during construction.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn transport(&self) -> &Arc<TransportConfig> {
        &self.transport
    }
}

#[async_trait]
impl Resolver for Registry {
    async fn resolve(&self, reference: &ImageReference) -> Result<Descriptor> {
        self.resolver.resolve(reference).await
    }

    async fn fetch(&self, reference: &ImageReference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.resolver.fetch(reference, descriptor).await
    }
}

fn base_resolver(opts: &RegistryOptions) -> Arc<OciResolver> {
    Arc::new(new_resolver(
        &opts.username,
        &opts.password,
        opts.insecure,
        opts.plain_http,
        &opts.effective_user_agent(),
        &opts.configs,
    ))
}

/// Build a registry around the base resolver.
///
/// Never fails: credential store problems degrade to anonymous access and are
/// reported through [`Registry::warnings`].
pub fn new_registry(opts: &RegistryOptions) -> Result<Registry> {
    let registry = Registry::from_base(base_resolver(opts));
    tracing::info!(
        insecure = opts.insecure,
        plain_http = opts.plain_http,
        explicit_credentials = opts.has_explicit_credentials(),
        warnings = registry.warnings.len(),
        "Registry ready"
    );
    Ok(registry)
}

/// Build a registry and layer discovery for `target_ref` over it.
///
/// Fails if the reference cannot be parsed or the endpoint cannot be probed.
pub async fn new_registry_with_discover(target_ref: &str, opts: &RegistryOptions) -> Result<Registry> {
    new_registry_with_discoverer(target_ref, opts, &ApiVersionProbe).await
}

/// [`new_registry_with_discover`] with a caller-supplied discoverer.
pub async fn new_registry_with_discoverer(
    target_ref: &str,
    opts: &RegistryOptions,
    discoverer: &dyn Discoverer,
) -> Result<Registry> {
    let base = base_resolver(opts);
    let transport = base.transport().clone();
    let warnings = base.warnings().to_vec();

    let discovered = match with_discover(target_ref, base, discoverer).await {
        Ok(resolver) => resolver,
        Err(e) => {
            tracing::warn!(reference = %target_ref, error = %e, "Registry discovery failed");
            return Err(e);
        }
    };

    let endpoint = discovered.endpoint().clone();
    tracing::info!(
        reference = %target_ref,
        endpoint = %endpoint.base_url,
        api_version = ?endpoint.api_version,
        primary = discovered.has_primary(),
        "Registry ready with discovered endpoint"
    );

    Ok(Registry {
        resolver: Arc::new(discovered),
        transport,
        warnings,
        state: RegistryState::DiscoveredResolverActive(endpoint),
    })
}

/// Build a push-capable target for `target_ref`.
///
/// Every step is fatal: reference parsing, login client construction and
/// target composition. The base registry is kept as the target's backup.
pub fn new_registry_target(target_ref: &str, opts: &RegistryOptions) -> Result<RemoteTarget> {
    let reference = ImageReference::parse(target_ref)?;
    let spec = reference.reference_spec();

    let mut login_opts = LoginOptions::new()
        .hostname(spec.host.clone())
        .username(opts.username.clone())
        .secret(opts.password.clone())
        .user_agent(opts.effective_user_agent());
    if opts.insecure {
        login_opts = login_opts.insecure();
    }
    // An explicit http:// prefix on the reference forces plain HTTP.
    if opts.plain_http || spec.scheme.as_deref() == Some("http") {
        login_opts = login_opts.plain_http();
    }

    let login = LoginClient::new(&spec.host, &spec.namespace, &opts.configs, login_opts)?;
    let backup = new_registry(opts)?;

    let target = RemoteTarget::from_remotes_registry(target_ref, login, Arc::new(backup))
        .map_err(|e| match e {
            SkiffError::TargetError(_) => e,
            other => SkiffError::TargetError(other.to_string()),
        })?;

    tracing::info!(reference = %target_ref, host = %spec.host, "Registry target ready");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TlsVerification;

    struct FixedDiscoverer(Result<Endpoint>);

    #[async_trait]
    impl Discoverer for FixedDiscoverer {
        async fn probe(
            &self,
            reference: &ImageReference,
            _transport: &TransportConfig,
        ) -> Result<Endpoint> {
            match &self.0 {
                Ok(endpoint) => Ok(endpoint.clone()),
                Err(e) => Err(SkiffError::DiscoveryError {
                    registry: reference.registry.clone(),
                    message: e.to_string(),
                }),
            }
        }
    }

    fn explicit_opts() -> RegistryOptions {
        RegistryOptions {
            username: "u".to_string(),
            password: "p".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_registry_base_state() {
        let registry = new_registry(&explicit_opts()).unwrap();
        assert_eq!(registry.state(), &RegistryState::BaseResolverActive);
        assert!(registry.warnings().is_empty());
        assert!(registry.transport().verifies_tls());
    }

    #[test]
    fn test_new_registry_insecure() {
        let opts = RegistryOptions {
            insecure: true,
            ..explicit_opts()
        };
        let registry = new_registry(&opts).unwrap();
        assert_eq!(registry.transport().tls(), TlsVerification::SkipVerify);
    }

    #[tokio::test]
    async fn test_discovered_state() {
        let endpoint = Endpoint {
            base_url: "https://registry.example.com".to_string(),
            api_version: Some("registry/2.0".to_string()),
            requires_auth: false,
        };
        let registry = new_registry_with_discoverer(
            "registry.example.com/ns/repo:tag",
            &explicit_opts(),
            &FixedDiscoverer(Ok(endpoint.clone())),
        )
        .await
        .unwrap();
        assert_eq!(
            registry.state(),
            &RegistryState::DiscoveredResolverActive(endpoint)
        );
    }

    #[tokio::test]
    async fn test_discovery_failure_is_fatal() {
        let err = new_registry_with_discoverer(
            "registry.example.com/ns/repo:tag",
            &explicit_opts(),
            &FixedDiscoverer(Err(SkiffError::Other("network unreachable".to_string()))),
        )
        .await
        .unwrap_err();
        match err {
            SkiffError::DiscoveryError { registry, message } => {
                assert_eq!(registry, "registry.example.com");
                assert!(message.contains("network unreachable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_discover_bad_reference_is_fatal() {
        let err = new_registry_with_discoverer(
            "registry.example.com/ns/repo:",
            &explicit_opts(),
            &FixedDiscoverer(Err(SkiffError::Other("unused".to_string()))),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SkiffError::ReferenceError(_)));
    }

    #[test]
    fn test_new_registry_target() {
        let target = new_registry_target("registry.example.com/ns/repo:v1", &explicit_opts()).unwrap();
        assert_eq!(target.login_client().host(), "registry.example.com");
        assert_eq!(target.login_client().namespace(), "ns/repo");
    }

    #[test]
    fn test_target_http_prefix_forces_plain_http() {
        let target =
            new_registry_target("http://localhost:5000/ns/repo:v1", &explicit_opts()).unwrap();
        assert_eq!(target.login_client().resolver().transport().scheme(), "http");
    }

    #[test]
    fn test_target_bad_store_is_fatal() {
        let opts = RegistryOptions {
            configs: vec!["/nonexistent/config.json".into()],
            ..Default::default()
        };
        let err = new_registry_target("registry.example.com/ns/repo:v1", &opts).unwrap_err();
        assert!(matches!(err, SkiffError::LoginError { .. }));
    }
}
