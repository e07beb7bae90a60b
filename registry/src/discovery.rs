//! Registry discovery.
//!
//! Probes a registry's distribution API endpoint before use. When the probe
//! lands on a different host or scheme than the base resolver would use, a
//! resolver bound to the discovered endpoint is layered over the base one.
//! Otherwise the base resolver serves every request alone.
//!
//! ```text
//!            ┌──────────────────────────┐
//!  resolve ─▶│ DiscoveryResolver        │
//!            │  primary  ─▶ endpoint    │──▶ ok
//!            │     │ error / absent     │
//!            │     ▼                    │
//!            │  fallback ─▶ base        │──▶ ok / error
//!            └──────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use skiff_core::error::{Result, SkiffError};

use crate::reference::ImageReference;
use crate::resolver::{Descriptor, OciResolver, Resolver};
use crate::transport::TransportConfig;

/// Header a distribution registry sets on `/v2/` responses.
const API_VERSION_HEADER: &str = "Docker-Distribution-API-Version";

/// Host that actually serves Docker Hub's distribution API.
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

/// A probed registry endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL of the registry (e.g., `https://ghcr.io`)
    pub base_url: String,
    /// Advertised API version (e.g., `registry/2.0`)
    pub api_version: Option<String>,
    /// The probe was answered with an authentication challenge
    pub requires_auth: bool,
}

impl Endpoint {
    /// True when the endpoint is served over plain HTTP.
    pub fn is_plain_http(&self) -> bool {
        self.base_url.starts_with("http://")
    }

    /// Host (and port) of the endpoint, without scheme.
    pub fn host(&self) -> &str {
        let url = self
            .base_url
            .strip_prefix("https://")
            .or_else(|| self.base_url.strip_prefix("http://"))
            .unwrap_or(&self.base_url);
        url.trim_end_matches('/')
    }
}

/// Locates the endpoint for a reference.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn probe(&self, reference: &ImageReference, transport: &TransportConfig)
        -> Result<Endpoint>;
}

/// Probes `GET /v2/` and accepts `200` or `401`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiVersionProbe;

impl ApiVersionProbe {
    /// URL probed for `reference` over `transport`.
    pub fn probe_url(reference: &ImageReference, transport: &TransportConfig) -> String {
        format!("{}/v2/", base_url(reference, transport))
    }
}

fn base_url(reference: &ImageReference, transport: &TransportConfig) -> String {
    let host = match reference.registry.as_str() {
        "docker.io" | "index.docker.io" => DOCKER_HUB_API_HOST,
        other => other,
    };
    format!("{}://{}", transport.scheme(), host)
}

#[async_trait]
impl Discoverer for ApiVersionProbe {
    async fn probe(
        &self,
        reference: &ImageReference,
        transport: &TransportConfig,
    ) -> Result<Endpoint> {
        let url = Self::probe_url(reference, transport);
        let discovery_error = |message: String| SkiffError::DiscoveryError {
            registry: reference.registry.clone(),
            message,
        };

        let response = transport
            .http_client()?
            .get(&url)
            .send()
            .await
            .map_err(|e| discovery_error(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::UNAUTHORIZED {
            return Err(discovery_error(format!(
                "GET {} returned unexpected status {}",
                url, status
            )));
        }

        let api_version = response
            .headers()
            .get(API_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            api_version = ?api_version,
            "Registry endpoint discovered"
        );

        Ok(Endpoint {
            base_url: base_url(reference, transport),
            api_version,
            requires_auth: status == reqwest::StatusCode::UNAUTHORIZED,
        })
    }
}

/// Host the protocol client talks to for `reference`.
fn client_host(reference: &ImageReference) -> &str {
    match reference.registry.as_str() {
        "docker.io" => "index.docker.io",
        other => other,
    }
}

/// Resolver that sends every request to the discovered endpoint's host.
struct EndpointResolver {
    host: String,
    inner: OciResolver,
}

impl EndpointResolver {
    fn rebind(&self, reference: &ImageReference) -> ImageReference {
        ImageReference {
            registry: self.host.clone(),
            ..reference.clone()
        }
    }
}

#[async_trait]
impl Resolver for EndpointResolver {
    async fn resolve(&self, reference: &ImageReference) -> Result<Descriptor> {
        self.inner.resolve(&self.rebind(reference)).await
    }

    async fn fetch(&self, reference: &ImageReference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        self.inner.fetch(&self.rebind(reference), descriptor).await
    }
}

/// Resolver bound to a discovered endpoint, falling back to the base resolver.
pub struct DiscoveryResolver {
    endpoint: Endpoint,
    primary: Option<Arc<dyn Resolver>>,
    fallback: Arc<dyn Resolver>,
}

impl DiscoveryResolver {
    /// `primary` is `None` when the endpoint is the one `fallback` already uses.
    pub fn new(
        endpoint: Endpoint,
        primary: Option<Arc<dyn Resolver>>,
        fallback: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            endpoint,
            primary,
            fallback,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// True when requests try a resolver bound to the endpoint first.
    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl Resolver for DiscoveryResolver {
    async fn resolve(&self, reference: &ImageReference) -> Result<Descriptor> {
        let Some(primary) = &self.primary else {
            return self.fallback.resolve(reference).await;
        };
        match primary.resolve(reference).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => {
                tracing::debug!(
                    reference = %reference,
                    error = %e,
                    "Discovered endpoint failed to resolve, using base resolver"
                );
                self.fallback.resolve(reference).await
            }
        }
    }

    async fn fetch(&self, reference: &ImageReference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let Some(primary) = &self.primary else {
            return self.fallback.fetch(reference, descriptor).await;
        };
        match primary.fetch(reference, descriptor).await {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::debug!(
                    reference = %reference,
                    digest = %descriptor.digest,
                    error = %e,
                    "Discovered endpoint failed to fetch, using base resolver"
                );
                self.fallback.fetch(reference, descriptor).await
            }
        }
    }
}

/// Wrap `base` with discovery for `target_ref`.
///
/// The probe uses the base resolver's transport. A parse or probe failure is
/// returned as an error; there is no degraded result. A primary resolver is
/// only built when the endpoint's host or scheme differs from the base's.
pub async fn with_discover(
    target_ref: &str,
    base: Arc<OciResolver>,
    discoverer: &dyn Discoverer,
) -> Result<DiscoveryResolver> {
    let reference = ImageReference::parse(target_ref)?;
    let endpoint = discoverer.probe(&reference, base.transport()).await?;

    let same_endpoint = endpoint.host() == client_host(&reference)
        && endpoint.is_plain_http() == base.transport().plain_http();
    let primary: Option<Arc<dyn Resolver>> = if same_endpoint {
        None
    } else {
        let transport = Arc::new(base.transport().with_plain_http(endpoint.is_plain_http()));
        Some(Arc::new(EndpointResolver {
            host: endpoint.host().to_string(),
            inner: OciResolver::new(base.credentials().clone(), transport),
        }))
    };

    Ok(DiscoveryResolver::new(endpoint, primary, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver that fails or succeeds and counts calls.
    struct CountingResolver {
        fail: bool,
        calls: AtomicUsize,
    }

    impl CountingResolver {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Resolver for CountingResolver {
        async fn resolve(&self, reference: &ImageReference) -> Result<Descriptor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SkiffError::RegistryError {
                    registry: reference.registry.clone(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(Descriptor::for_content("application/vnd.oci.image.manifest.v1+json", b"{}"))
        }

        async fn fetch(&self, reference: &ImageReference, _descriptor: &Descriptor) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SkiffError::RegistryError {
                    registry: reference.registry.clone(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(b"{}".to_vec())
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            base_url: "https://registry.example.com".to_string(),
            api_version: Some("registry/2.0".to_string()),
            requires_auth: true,
        }
    }

    #[test]
    fn test_probe_url() {
        let secure = TransportConfig::new(false, false, "");
        let plain = TransportConfig::new(false, true, "");

        let r = ImageReference::parse("registry.example.com/ns/repo:tag").unwrap();
        assert_eq!(
            ApiVersionProbe::probe_url(&r, &secure),
            "https://registry.example.com/v2/"
        );
        assert_eq!(
            ApiVersionProbe::probe_url(&r, &plain),
            "http://registry.example.com/v2/"
        );

        let hub = ImageReference::parse("nginx").unwrap();
        assert_eq!(
            ApiVersionProbe::probe_url(&hub, &secure),
            "https://registry-1.docker.io/v2/"
        );
    }

    #[test]
    fn test_endpoint_plain_http() {
        assert!(!endpoint().is_plain_http());
        let plain = Endpoint {
            base_url: "http://localhost:5000".to_string(),
            ..endpoint()
        };
        assert!(plain.is_plain_http());
    }

    #[tokio::test]
    async fn test_primary_used_first() {
        let primary = CountingResolver::new(false);
        let fallback = CountingResolver::new(false);
        let resolver = DiscoveryResolver::new(endpoint(), Some(primary.clone()), fallback.clone());

        let r = ImageReference::parse("registry.example.com/ns/repo:tag").unwrap();
        resolver.resolve(&r).await.unwrap();

        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_primary_error() {
        let primary = CountingResolver::new(true);
        let fallback = CountingResolver::new(false);
        let resolver = DiscoveryResolver::new(endpoint(), Some(primary.clone()), fallback.clone());

        let r = ImageReference::parse("registry.example.com/ns/repo:tag").unwrap();
        let descriptor = resolver.resolve(&r).await.unwrap();
        let data = resolver.fetch(&r, &descriptor).await.unwrap();

        assert_eq!(data, b"{}");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_both_failing_returns_fallback_error() {
        let resolver = DiscoveryResolver::new(
            endpoint(),
            Some(CountingResolver::new(true)),
            CountingResolver::new(true),
        );

        let r = ImageReference::parse("registry.example.com/ns/repo:tag").unwrap();
        let err = resolver.resolve(&r).await.unwrap_err();
        assert!(matches!(err, SkiffError::RegistryError { .. }));
    }

    struct FixedDiscoverer(Endpoint);

    #[async_trait]
    impl Discoverer for FixedDiscoverer {
        async fn probe(&self, _: &ImageReference, _: &TransportConfig) -> Result<Endpoint> {
            Ok(self.0.clone())
        }
    }

    fn base(plain_http: bool) -> Arc<OciResolver> {
        Arc::new(OciResolver::new(
            Arc::new(crate::auth::AnonymousCredentials),
            Arc::new(TransportConfig::new(false, plain_http, "")),
        ))
    }

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint().host(), "registry.example.com");
        let with_port = Endpoint {
            base_url: "http://localhost:5000/".to_string(),
            ..endpoint()
        };
        assert_eq!(with_port.host(), "localhost:5000");
    }

    #[tokio::test]
    async fn test_same_endpoint_uses_base_only() {
        let discovered = with_discover(
            "registry.example.com/ns/repo:tag",
            base(false),
            &FixedDiscoverer(endpoint()),
        )
        .await
        .unwrap();
        assert!(!discovered.has_primary());
    }

    #[tokio::test]
    async fn test_different_scheme_builds_primary() {
        let discovered = with_discover(
            "registry.example.com/ns/repo:tag",
            base(true),
            &FixedDiscoverer(endpoint()),
        )
        .await
        .unwrap();
        assert!(discovered.has_primary());
    }

    #[tokio::test]
    async fn test_docker_hub_api_host_builds_primary() {
        let hub = Endpoint {
            base_url: "https://registry-1.docker.io".to_string(),
            ..endpoint()
        };
        let discovered = with_discover("nginx:latest", base(false), &FixedDiscoverer(hub))
            .await
            .unwrap();
        assert!(discovered.has_primary());
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // Grab a free port, then close it so nothing is listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let r = ImageReference::parse(&format!("127.0.0.1:{}/ns/repo:tag", port)).unwrap();
        let transport = TransportConfig::new(false, true, "");

        let err = ApiVersionProbe.probe(&r, &transport).await.unwrap_err();
        assert!(matches!(err, SkiffError::DiscoveryError { .. }));
    }
}
