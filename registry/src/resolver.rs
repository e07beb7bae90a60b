//! Base registry resolver.
//!
//! Uses the `oci-distribution` crate to resolve references to descriptors
//! and fetch content by digest. The builder never fails: credential and
//! transport problems surface when the resolver is used.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::RegistryOperation;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use skiff_core::error::{Result, SkiffError};

use crate::auth::{resolve_credentials, CredentialRequest, CredentialSource, RegistryAuth};
use crate::reference::ImageReference;
use crate::transport::TransportConfig;

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Manifest media types accepted when resolving a reference.
pub const MANIFEST_MEDIA_TYPES: [&str; 4] = [
    OCI_MANIFEST_MEDIA_TYPE,
    OCI_INDEX_MEDIA_TYPE,
    DOCKER_MANIFEST_MEDIA_TYPE,
    DOCKER_MANIFEST_LIST_MEDIA_TYPE,
];

/// OCI content descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: i64,
}

impl Descriptor {
    /// Describe `content` with a sha256 digest.
    pub fn for_content(media_type: impl Into<String>, content: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            digest: sha256_digest(content),
            size: content.len() as i64,
        }
    }

    pub fn is_manifest(&self) -> bool {
        MANIFEST_MEDIA_TYPES.contains(&self.media_type.as_str())
    }

    fn to_oci_descriptor(&self) -> OciDescriptor {
        OciDescriptor {
            media_type: self.media_type.clone(),
            digest: self.digest.clone(),
            size: self.size,
            ..Default::default()
        }
    }
}

/// `sha256:<hex>` digest of `content`.
pub fn sha256_digest(content: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(content)))
}

/// Resolve references and fetch content.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a reference to the descriptor of its manifest.
    async fn resolve(&self, reference: &ImageReference) -> Result<Descriptor>;

    /// Fetch the content a descriptor points at, within the reference's repository.
    async fn fetch(&self, reference: &ImageReference, descriptor: &Descriptor) -> Result<Vec<u8>>;
}

/// Resolver backed by an exclusively-owned `oci-distribution` client.
pub struct OciResolver {
    client: oci_distribution::Client,
    credentials: Arc<dyn CredentialSource>,
    transport: Arc<TransportConfig>,
    warnings: Vec<String>,
}

impl std::fmt::Debug for OciResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciResolver")
            .field("credentials", &self.credentials)
            .field("transport", &self.transport)
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl OciResolver {
    /// Resolver using `credentials` over `transport`.
    pub fn new(credentials: Arc<dyn CredentialSource>, transport: Arc<TransportConfig>) -> Self {
        Self {
            client: transport.oci_client(),
            credentials,
            transport,
            warnings: Vec::new(),
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    pub fn transport(&self) -> &Arc<TransportConfig> {
        &self.transport
    }

    /// Soft failures met while picking credentials.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn auth_for(&self, reference: &ImageReference) -> Result<RegistryAuth> {
        self.credentials.credentials(&reference.registry)
    }

    fn registry_error(reference: &ImageReference, message: String) -> SkiffError {
        SkiffError::RegistryError {
            registry: reference.registry.clone(),
            message,
        }
    }

    /// Fetch a manifest and its digest.
    async fn pull_manifest(&self, reference: &ImageReference) -> Result<(Vec<u8>, String)> {
        let oci_ref = reference.to_oci_reference()?;
        let auth = self.auth_for(reference)?.to_oci_auth();

        self.client
            .pull_manifest_raw(&oci_ref, &auth, &MANIFEST_MEDIA_TYPES)
            .await
            .map_err(|e| Self::registry_error(reference, format!("Failed to pull manifest: {}", e)))
    }

    /// Upload content to the reference's repository.
    ///
    /// `content` must hash to `descriptor.digest`. Manifests are tagged with the
    /// reference's tag (or pinned by digest); everything else is pushed as a blob.
    /// Returns the location reported by the registry.
    pub async fn push(
        &self,
        reference: &ImageReference,
        descriptor: &Descriptor,
        content: Vec<u8>,
    ) -> Result<String> {
        let actual = sha256_digest(&content);
        if actual != descriptor.digest {
            return Err(SkiffError::DigestMismatch {
                expected: descriptor.digest.clone(),
                actual,
            });
        }

        let oci_ref = reference.to_oci_reference()?;
        let auth = self.auth_for(reference)?.to_oci_auth();
        self.client
            .auth(&oci_ref, &auth, RegistryOperation::Push)
            .await
            .map_err(|e| Self::registry_error(reference, format!("Failed to authenticate for push: {}", e)))?;

        tracing::info!(
            reference = %reference,
            digest = %descriptor.digest,
            media_type = %descriptor.media_type,
            size = descriptor.size,
            "Pushing content to registry"
        );

        if descriptor.is_manifest() {
            // Header type comes from the protocol client's own `http` version
            let content_type = descriptor.media_type.parse().map_err(|_| {
                SkiffError::Other(format!("Invalid media type: {}", descriptor.media_type))
            })?;
            self.client
                .push_manifest_raw(&oci_ref, content, content_type)
                .await
                .map_err(|e| Self::registry_error(reference, format!("Failed to push manifest: {}", e)))
        } else {
            self.client
                .push_blob(&oci_ref, &content, &descriptor.digest)
                .await
                .map_err(|e| Self::registry_error(reference, format!("Failed to push blob: {}", e)))
        }
    }
}

#[async_trait]
impl Resolver for OciResolver {
    async fn resolve(&self, reference: &ImageReference) -> Result<Descriptor> {
        let (manifest, digest) = self.pull_manifest(reference).await?;
        let media_type = manifest_media_type(&manifest);

        tracing::debug!(
            reference = %reference,
            digest = %digest,
            media_type = %media_type,
            "Resolved reference"
        );

        Ok(Descriptor {
            media_type,
            digest,
            size: manifest.len() as i64,
        })
    }

    async fn fetch(&self, reference: &ImageReference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let pinned = reference.with_digest(&descriptor.digest);

        let data = if descriptor.is_manifest() {
            self.pull_manifest(&pinned).await?.0
        } else {
            let oci_ref = pinned.to_oci_reference()?;
            let auth = self.auth_for(reference)?.to_oci_auth();
            self.client
                .auth(&oci_ref, &auth, RegistryOperation::Pull)
                .await
                .map_err(|e| Self::registry_error(reference, format!("Failed to authenticate: {}", e)))?;

            tracing::debug!(
                digest = %descriptor.digest,
                size = descriptor.size,
                "Fetching blob"
            );

            let mut data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(&oci_ref, &descriptor.to_oci_descriptor(), &mut data)
                .await
                .map_err(|e| {
                    Self::registry_error(
                        reference,
                        format!("Failed to pull blob {}: {}", descriptor.digest, e),
                    )
                })?;
            data
        };

        let actual = sha256_digest(&data);
        if descriptor.digest.starts_with("sha256:") && actual != descriptor.digest {
            return Err(SkiffError::DigestMismatch {
                expected: descriptor.digest.clone(),
                actual,
            });
        }
        Ok(data)
    }
}

/// Media type declared by a manifest body; OCI manifest when absent.
fn manifest_media_type(manifest: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(manifest)
        .ok()
        .and_then(|v| v.get("mediaType").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| OCI_MANIFEST_MEDIA_TYPE.to_string())
}

/// Build a base resolver.
///
/// Explicit credentials win over the credential store; store failures
/// degrade to anonymous access with a warning. Each resolver gets its own
/// transport, so `insecure` never leaks into other resolvers.
pub fn new_resolver(
    username: &str,
    password: &str,
    insecure: bool,
    plain_http: bool,
    user_agent: &str,
    config_paths: &[PathBuf],
) -> OciResolver {
    let transport = Arc::new(TransportConfig::new(insecure, plain_http, user_agent));

    let resolution = resolve_credentials(&CredentialRequest {
        username: username.to_string(),
        password: password.to_string(),
        config_paths: config_paths.to_vec(),
        plain_http,
    });

    let mut resolver = OciResolver::new(resolution.source, transport);
    resolver.warnings = resolution.warnings;
    resolver
}
