use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SkiffError};

/// Registry connection options.
///
/// Create one per registry configuration. A handle built from these options
/// carries their credentials for its whole lifetime, so options for one
/// registry should not be reused for another with different credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryOptions {
    /// Credential store files, in precedence order (empty = default location)
    pub configs: Vec<PathBuf>,

    /// Explicit username
    pub username: String,

    /// Explicit password or token
    pub password: String,

    /// Skip TLS certificate verification
    pub insecure: bool,

    /// Talk to the registry over plain HTTP
    pub plain_http: bool,

    /// User-Agent header sent to the registry
    pub user_agent: String,
}

impl RegistryOptions {
    /// Load options from a YAML (or JSON) file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            SkiffError::ConfigError(format!(
                "Failed to read registry options {}: {}",
                path.display(),
                e
            ))
        })?;
        let options: RegistryOptions = serde_yaml::from_str(&data)?;
        Ok(options)
    }

    /// True when a username or password was given explicitly.
    pub fn has_explicit_credentials(&self) -> bool {
        is_explicit_credentials(&self.username, &self.password)
    }

    /// User agent to send, falling back to `skiff/<version>`.
    pub fn effective_user_agent(&self) -> String {
        if self.user_agent.is_empty() {
            default_user_agent()
        } else {
            self.user_agent.clone()
        }
    }
}

/// True when either half of a credential pair is non-empty.
pub fn is_explicit_credentials(username: &str, password: &str) -> bool {
    !username.is_empty() || !password.is_empty()
}

/// Default User-Agent header value.
pub fn default_user_agent() -> String {
    format!("skiff/{}", crate::VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_options() {
        let opts = RegistryOptions::default();
        assert!(opts.configs.is_empty());
        assert!(!opts.insecure);
        assert!(!opts.plain_http);
        assert!(!opts.has_explicit_credentials());
    }

    #[test]
    fn test_explicit_credentials() {
        let opts = RegistryOptions {
            username: "u".to_string(),
            ..Default::default()
        };
        assert!(opts.has_explicit_credentials());

        let opts = RegistryOptions {
            password: "token".to_string(),
            ..Default::default()
        };
        assert!(opts.has_explicit_credentials());
    }

    #[test]
    fn test_effective_user_agent() {
        let opts = RegistryOptions::default();
        assert!(opts.effective_user_agent().starts_with("skiff/"));

        let opts = RegistryOptions {
            user_agent: "custom/1.0".to_string(),
            ..Default::default()
        };
        assert_eq!(opts.effective_user_agent(), "custom/1.0");
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(
            &path,
            "configs:\n  - /etc/skiff/auth.json\nusername: u\npassword: p\ninsecure: true\n",
        )
        .unwrap();

        let opts = RegistryOptions::from_file(&path).unwrap();
        assert_eq!(opts.configs, vec![PathBuf::from("/etc/skiff/auth.json")]);
        assert_eq!(opts.username, "u");
        assert_eq!(opts.password, "p");
        assert!(opts.insecure);
        assert!(!opts.plain_http);
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, r#"{"plain_http": true, "user_agent": "ci"}"#).unwrap();

        let opts = RegistryOptions::from_file(&path).unwrap();
        assert!(opts.plain_http);
        assert_eq!(opts.user_agent, "ci");
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(&path, "hostname: ghcr.io\n").unwrap();

        let err = RegistryOptions::from_file(&path).unwrap_err();
        assert!(matches!(err, SkiffError::SerializationError(_)));
    }

    #[test]
    fn test_from_missing_file() {
        let err = RegistryOptions::from_file(Path::new("/nonexistent/registry.yaml")).unwrap_err();
        assert!(matches!(err, SkiffError::ConfigError(_)));
    }
}
