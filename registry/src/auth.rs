//! Credential resolution for registry clients.
//!
//! Picks exactly one credential source per resolver, walking an ordered list
//! of tiers:
//!
//! 1. `Explicit`: a username or secret was given, used for every host.
//! 2. `ConfigStore`: per-host lookup in the Docker credential store.
//! 3. `Anonymous`: no credentials.
//!
//! A tier that cannot be built degrades to the next one with a warning.
//! Resolution itself never fails.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use skiff_core::config::is_explicit_credentials;
use skiff_core::error::Result;

use crate::credentials::{CredentialStore, StoreCredentials};

/// Authentication credentials for a container registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Convert to oci-distribution auth type.
    pub(crate) fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

// Keep secrets out of logs.
impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Which tier produced a credential source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSourceKind {
    Explicit,
    ConfigStore,
    Anonymous,
}

impl fmt::Display for CredentialSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialSourceKind::Explicit => "explicit",
            CredentialSourceKind::ConfigStore => "config-store",
            CredentialSourceKind::Anonymous => "anonymous",
        };
        f.write_str(name)
    }
}

/// Capability mapping a registry host to the credentials to present.
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Credentials for `host`.
    fn credentials(&self, host: &str) -> Result<RegistryAuth>;

    /// Which tier this source came from.
    fn kind(&self) -> CredentialSourceKind;
}

/// Same credentials for every host.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    auth: RegistryAuth,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth: RegistryAuth::basic(username, password),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self, _host: &str) -> Result<RegistryAuth> {
        Ok(self.auth.clone())
    }

    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::Explicit
    }
}

/// No credentials for any host.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousCredentials;

impl CredentialSource for AnonymousCredentials {
    fn credentials(&self, _host: &str) -> Result<RegistryAuth> {
        Ok(RegistryAuth::anonymous())
    }

    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::Anonymous
    }
}

impl CredentialSource for StoreCredentials {
    fn credentials(&self, host: &str) -> Result<RegistryAuth> {
        Ok(self.get(host))
    }

    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::ConfigStore
    }
}

/// Inputs to credential resolution.
#[derive(Debug, Clone, Default)]
pub struct CredentialRequest {
    pub username: String,
    pub password: String,
    pub config_paths: Vec<PathBuf>,
    pub plain_http: bool,
}

/// Chosen credential source plus any soft failures met on the way.
#[derive(Debug, Clone)]
pub struct CredentialResolution {
    pub source: Arc<dyn CredentialSource>,
    pub warnings: Vec<String>,
}

/// Result of trying one tier.
enum TierOutcome {
    Ready(Arc<dyn CredentialSource>),
    Skipped,
    Degraded(String),
}

#[derive(Debug, Clone, Copy)]
enum CredentialTier {
    Explicit,
    ConfigStore,
    Anonymous,
}

/// Tiers in precedence order. `Anonymous` is always ready.
const TIERS: [CredentialTier; 3] = [
    CredentialTier::Explicit,
    CredentialTier::ConfigStore,
    CredentialTier::Anonymous,
];

impl CredentialTier {
    fn build(self, request: &CredentialRequest) -> TierOutcome {
        match self {
            CredentialTier::Explicit => {
                if is_explicit_credentials(&request.username, &request.password) {
                    TierOutcome::Ready(Arc::new(StaticCredentials::new(
                        request.username.clone(),
                        request.password.clone(),
                    )))
                } else {
                    TierOutcome::Skipped
                }
            }
            CredentialTier::ConfigStore => {
                let store = match CredentialStore::load(&request.config_paths) {
                    Ok(store) => store,
                    Err(e) => return TierOutcome::Degraded(format!("Error loading auth file: {}", e)),
                };
                match store.credential_source(request.plain_http) {
                    Ok(source) => TierOutcome::Ready(Arc::new(source)),
                    Err(e) => TierOutcome::Degraded(format!("Error loading resolver: {}", e)),
                }
            }
            CredentialTier::Anonymous => TierOutcome::Ready(Arc::new(AnonymousCredentials)),
        }
    }
}

/// Pick the credential source for a resolver.
///
/// Explicit credentials short-circuit the credential store entirely. Store
/// failures are logged as warnings and returned, never raised.
pub fn resolve_credentials(request: &CredentialRequest) -> CredentialResolution {
    let mut warnings = Vec::new();

    for tier in TIERS {
        match tier.build(request) {
            TierOutcome::Ready(source) => {
                tracing::debug!(
                    source = %source.kind(),
                    warnings = warnings.len(),
                    "Resolved registry credential source"
                );
                return CredentialResolution { source, warnings };
            }
            TierOutcome::Skipped => {}
            TierOutcome::Degraded(warning) => {
                tracing::warn!(tier = ?tier, "{}", warning);
                warnings.push(warning);
            }
        }
    }

    // Unreachable in practice: the last tier always succeeds.
    CredentialResolution {
        source: Arc::new(AnonymousCredentials),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(username: &str, password: &str, config_paths: Vec<PathBuf>) -> CredentialRequest {
        CredentialRequest {
            username: username.to_string(),
            password: password.to_string(),
            config_paths,
            plain_http: false,
        }
    }

    #[test]
    fn test_registry_auth_anonymous() {
        let auth = RegistryAuth::anonymous();
        assert!(auth.is_anonymous());
        assert!(matches!(auth.to_oci_auth(), OciRegistryAuth::Anonymous));
    }

    #[test]
    fn test_registry_auth_basic() {
        let auth = RegistryAuth::basic("user", "pass");
        assert_eq!(auth.username(), Some("user"));
        assert_eq!(auth.password(), Some("pass"));
        assert!(matches!(auth.to_oci_auth(), OciRegistryAuth::Basic(u, p) if u == "user" && p == "pass"));
    }

    #[test]
    fn test_registry_auth_debug_redacts_password() {
        let debug = format!("{:?}", RegistryAuth::basic("user", "hunter2"));
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_explicit_ignores_invalid_paths() {
        let resolution = resolve_credentials(&request(
            "u",
            "p",
            vec![PathBuf::from("/nonexistent")],
        ));
        assert_eq!(resolution.source.kind(), CredentialSourceKind::Explicit);
        assert!(resolution.warnings.is_empty());
        for host in ["any-host", "ghcr.io", "docker.io"] {
            assert_eq!(
                resolution.source.credentials(host).unwrap(),
                RegistryAuth::basic("u", "p")
            );
        }
    }

    #[test]
    fn test_secret_only_is_explicit() {
        let resolution = resolve_credentials(&request("", "token", Vec::new()));
        assert_eq!(resolution.source.kind(), CredentialSourceKind::Explicit);
        assert_eq!(
            resolution.source.credentials("ghcr.io").unwrap(),
            RegistryAuth::basic("", "token")
        );
    }

    #[test]
    fn test_valid_store_no_warnings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"auths": {"ghcr.io": {"username": "store-user", "password": "store-pass"}}}"#,
        )
        .unwrap();

        let resolution = resolve_credentials(&request("", "", vec![path]));
        assert_eq!(resolution.source.kind(), CredentialSourceKind::ConfigStore);
        assert!(resolution.warnings.is_empty());
        assert_eq!(
            resolution.source.credentials("ghcr.io").unwrap(),
            RegistryAuth::basic("store-user", "store-pass")
        );
        assert!(resolution.source.credentials("quay.io").unwrap().is_anonymous());
    }

    #[test]
    fn test_unreadable_store_degrades_with_one_warning() {
        let resolution = resolve_credentials(&request(
            "",
            "",
            vec![PathBuf::from("/nonexistent/config.json")],
        ));
        assert_eq!(resolution.source.kind(), CredentialSourceKind::Anonymous);
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.warnings[0].starts_with("Error loading auth file"));
        assert!(resolution.source.credentials("ghcr.io").unwrap().is_anonymous());
    }

    #[test]
    fn test_malformed_entry_degrades_with_one_warning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"auths": {"ghcr.io": {"auth": "%%%"}}}"#).unwrap();

        let resolution = resolve_credentials(&request("", "", vec![path]));
        assert_eq!(resolution.source.kind(), CredentialSourceKind::Anonymous);
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.warnings[0].starts_with("Error loading resolver"));
    }

    #[test]
    fn test_default_location_at_most_one_warning() {
        let resolution = resolve_credentials(&request("", "", Vec::new()));
        assert_ne!(resolution.source.kind(), CredentialSourceKind::Explicit);
        assert!(resolution.warnings.len() <= 1);
    }

    #[test]
    fn test_source_kind_display() {
        assert_eq!(CredentialSourceKind::Explicit.to_string(), "explicit");
        assert_eq!(CredentialSourceKind::ConfigStore.to_string(), "config-store");
        assert_eq!(CredentialSourceKind::Anonymous.to_string(), "anonymous");
    }
}
