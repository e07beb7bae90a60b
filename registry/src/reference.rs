//! Registry reference parsing.
//!
//! Parses references like `registry.example.com/ns/repo:tag` into structured
//! components and converts them to the protocol client's reference type.

use oci_distribution::Reference;
use skiff_core::error::{Result, SkiffError};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed registry reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Scheme prefix given in the reference (`http` or `https`), if any
    pub scheme: Option<String>,
    /// Registry hostname, with port if given (e.g., "ghcr.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "ns/repo")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

/// The pieces of a reference a registry client is scoped by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub scheme: Option<String>,
    pub host: String,
    pub namespace: String,
    /// Tag or digest the reference points at
    pub object: String,
}

impl ImageReference {
    /// Parse a reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `myuser/myimage:v1` → docker.io/myuser/myimage:v1
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `ghcr.io/org/image@sha256:abc...` → ghcr.io/org/image@sha256:abc...
    /// - `http://localhost:5000/image:tag` → scheme `http`, registry localhost:5000
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SkiffError::ReferenceError(
                "Empty image reference".to_string(),
            ));
        }

        let (scheme, rest) = split_scheme(reference)?;

        // Split off digest first (@ separator)
        let (name_tag, digest) = match rest.rfind('@') {
            Some(at_pos) => {
                let digest_part = &rest[at_pos + 1..];
                if !is_valid_digest(digest_part) {
                    return Err(SkiffError::ReferenceError(format!(
                        "Invalid digest format in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (&rest[..at_pos], Some(digest_part.to_string()))
            }
            None => (rest, None),
        };

        let (name, tag) = split_tag(name_tag);
        if let Some(ref t) = tag {
            if t.is_empty() {
                return Err(SkiffError::ReferenceError(format!(
                    "Empty tag in reference '{}'",
                    reference
                )));
            }
        }

        let (registry, repository) = split_registry_repository(name, reference)?;

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            scheme,
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split into scheme, host, namespace, and object (digest wins over tag).
    pub fn reference_spec(&self) -> ReferenceSpec {
        let object = self
            .digest
            .clone()
            .or_else(|| self.tag.clone())
            .unwrap_or_else(|| DEFAULT_TAG.to_string());
        ReferenceSpec {
            scheme: self.scheme.clone(),
            host: self.registry.clone(),
            namespace: self.repository.clone(),
            object,
        }
    }

    /// The same repository pinned to `digest`.
    pub fn with_digest(&self, digest: &str) -> Self {
        Self {
            scheme: self.scheme.clone(),
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest.to_string()),
        }
    }

    /// Get the full reference string, without any scheme prefix.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }

    /// Convert to an oci-distribution Reference.
    ///
    /// A digest pins the reference; otherwise the tag (or `latest`) is used.
    pub fn to_oci_reference(&self) -> Result<Reference> {
        let ref_str = match (&self.digest, &self.tag) {
            (Some(digest), _) => format!("{}/{}@{}", self.registry, self.repository, digest),
            (None, Some(tag)) => format!("{}/{}:{}", self.registry, self.repository, tag),
            (None, None) => format!("{}/{}:{}", self.registry, self.repository, DEFAULT_TAG),
        };

        ref_str.parse::<Reference>().map_err(|e| {
            SkiffError::ReferenceError(format!("Invalid OCI reference '{}': {}", ref_str, e))
        })
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = SkiffError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Strip an optional `http://` or `https://` prefix.
fn split_scheme(reference: &str) -> Result<(Option<String>, &str)> {
    match reference.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = scheme.to_ascii_lowercase();
            if scheme != "http" && scheme != "https" {
                return Err(SkiffError::ReferenceError(format!(
                    "Unsupported scheme '{}' in reference '{}'",
                    scheme, reference
                )));
            }
            Ok((Some(scheme), rest))
        }
        None => Ok((None, reference)),
    }
}

/// Split the tag off a name: the last colon after the last slash.
///
/// A bare `host:port` (no slash, all digits after the colon) is not a tag.
fn split_tag(name_tag: &str) -> (&str, Option<String>) {
    let last_segment_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
    let last_segment = &name_tag[last_segment_start..];

    match last_segment.rfind(':') {
        Some(colon_pos) => {
            let tag = &last_segment[colon_pos + 1..];
            if last_segment_start == 0 && !tag.is_empty() && tag.chars().all(|c| c.is_ascii_digit())
            {
                return (name_tag, None);
            }
            let name = &name_tag[..last_segment_start + colon_pos];
            (name, Some(tag.to_string()))
        }
        None => (name_tag, None),
    }
}

/// Split a name into registry and repository components.
fn split_registry_repository(name: &str, reference: &str) -> Result<(String, String)> {
    // First component is a registry if it looks like a hostname
    // (contains a dot or colon, or is "localhost")
    if let Some((first, repo)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if repo.is_empty() {
                return Err(SkiffError::ReferenceError(format!(
                    "Empty repository in reference '{}'",
                    reference
                )));
            }
            return Ok((first.to_string(), repo.to_string()));
        }
    }

    if name.is_empty() || name.ends_with('/') {
        return Err(SkiffError::ReferenceError(format!(
            "Empty repository in reference '{}'",
            reference
        )));
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        // Single name like "nginx" → "library/nginx" for Docker Hub
        format!("library/{}", name)
    };

    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

fn is_valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, hex)) => !algorithm.is_empty() && !hex.is_empty(),
        None => false,
    }
}
