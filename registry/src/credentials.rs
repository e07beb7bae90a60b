//! Docker-style credential store for container registries.
//!
//! Reads the `auths` section of one or more Docker `config.json` files
//! (`$DOCKER_CONFIG/config.json` or `~/.docker/config.json` by default).
//! Earlier files take precedence per registry. Writes go to the first file
//! and use atomic writes (write tmp, rename).

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::Deserialize;
use skiff_core::error::{Result, SkiffError};

use crate::auth::RegistryAuth;

/// Canonical Docker Hub host used as the store key for all its aliases.
const DOCKER_HUB: &str = "index.docker.io";

/// Single `auths` entry in a Docker config file.
#[derive(Debug, Clone, Default, Deserialize)]
struct AuthEntry {
    /// Base64-encoded "username:password"
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// The parts of a Docker config file the store reads.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

/// A loaded config file and where it came from.
#[derive(Debug)]
struct LoadedConfig {
    path: PathBuf,
    file: ConfigFile,
}

/// Credential store backed by Docker config files.
#[derive(Debug)]
pub struct CredentialStore {
    paths: Vec<PathBuf>,
    configs: Vec<LoadedConfig>,
}

impl CredentialStore {
    /// Load the store from `paths`, or from the default location when empty.
    ///
    /// A missing default file is an empty store. A path given explicitly must
    /// exist and parse.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        if paths.is_empty() {
            let path = default_config_path()?;
            let file = if path.exists() {
                read_config(&path)?
            } else {
                ConfigFile::default()
            };
            return Ok(Self {
                paths: vec![path.clone()],
                configs: vec![LoadedConfig { path, file }],
            });
        }

        let configs = paths
            .iter()
            .map(|path| {
                Ok(LoadedConfig {
                    path: path.clone(),
                    file: read_config(path)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            paths: paths.to_vec(),
            configs,
        })
    }

    /// Derive a per-host credential source.
    ///
    /// Entries whose key carries a scheme matching `plain_http` (`http://`
    /// or `https://`) win over entries for the same host with the other
    /// scheme or none. Fails on the first malformed entry.
    pub fn credential_source(&self, plain_http: bool) -> Result<StoreCredentials> {
        let preferred = if plain_http { "http" } else { "https" };
        // (file index, scheme rank), lower wins
        let mut best: HashMap<String, ((usize, u8), RegistryAuth)> = HashMap::new();

        for (index, config) in self.configs.iter().enumerate() {
            for (key, entry) in &config.file.auths {
                let Some(auth) = decode_entry(entry).map_err(|message| {
                    SkiffError::CredentialStoreError {
                        path: config.path.display().to_string(),
                        message: format!("entry '{}': {}", key, message),
                    }
                })?
                else {
                    continue;
                };

                let (scheme, host) = split_key(key);
                let rank = match scheme {
                    Some(s) if s == preferred => 0,
                    None => 1,
                    Some(_) => 2,
                };
                let priority = (index, rank);

                let replace = best
                    .get(&host)
                    .map_or(true, |(existing, _)| priority < *existing);
                if replace {
                    best.insert(host, (priority, auth));
                }
            }
        }

        Ok(StoreCredentials {
            entries: best.into_iter().map(|(host, (_, auth))| (host, auth)).collect(),
        })
    }

    /// Store credentials for a registry in the first file. Overwrites an existing entry.
    pub fn store(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        let path = self.primary_path()?;
        let mut doc = read_document(path)?;
        let auths = auths_object(&mut doc, path)?;

        // Drop every key that names the same registry before inserting
        remove_registry_keys(auths, &normalize_registry(registry));

        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        auths.insert(
            storage_key(registry),
            serde_json::json!({ "auth": encoded }),
        );

        write_document(path, &doc)
    }

    /// Remove credentials for a registry from the first file. Returns true if an entry existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let path = self.primary_path()?;
        if !path.exists() {
            return Ok(false);
        }
        let mut doc = read_document(path)?;
        let auths = auths_object(&mut doc, path)?;

        let removed = remove_registry_keys(auths, &normalize_registry(registry)) > 0;

        if removed {
            write_document(path, &doc)?;
        }
        Ok(removed)
    }

    fn primary_path(&self) -> Result<&Path> {
        self.paths
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| SkiffError::Other("Credential store has no backing file".to_string()))
    }
}

/// Per-host credentials derived from a [`CredentialStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreCredentials {
    entries: HashMap<String, RegistryAuth>,
}

impl StoreCredentials {
    /// Credentials for `host`; anonymous when the store has none.
    pub fn get(&self, host: &str) -> RegistryAuth {
        self.entries
            .get(&normalize_registry(host))
            .cloned()
            .unwrap_or_else(RegistryAuth::anonymous)
    }

    /// Number of registries with credentials.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Default config path: `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`.
pub fn default_config_path() -> Result<PathBuf> {
    config_path_from(std::env::var_os("DOCKER_CONFIG"), dirs::home_dir())
}

fn config_path_from(docker_config: Option<OsString>, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = docker_config.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir).join("config.json"));
    }
    let home = home.ok_or_else(|| {
        SkiffError::Other("Cannot determine home directory for credential store".to_string())
    })?;
    Ok(home.join(".docker").join("config.json"))
}

fn read_config(path: &Path) -> Result<ConfigFile> {
    let data = std::fs::read_to_string(path).map_err(|e| SkiffError::CredentialStoreError {
        path: path.display().to_string(),
        message: format!("Failed to read: {}", e),
    })?;
    serde_json::from_str(&data).map_err(|e| SkiffError::CredentialStoreError {
        path: path.display().to_string(),
        message: format!("Failed to parse: {}", e),
    })
}

/// Decode an entry. `Ok(None)` means the entry carries no usable credentials.
fn decode_entry(entry: &AuthEntry) -> std::result::Result<Option<RegistryAuth>, String> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Ok(Some(RegistryAuth::basic(username, password)));
    }

    match entry.auth.as_deref() {
        Some(auth) if !auth.is_empty() => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(auth)
                .map_err(|e| format!("invalid base64 in auth field: {}", e))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|_| "auth field is not valid UTF-8".to_string())?;
            let (username, password) = decoded
                .split_once(':')
                .ok_or_else(|| "auth field is not in username:password form".to_string())?;
            Ok(Some(RegistryAuth::basic(username, password)))
        }
        _ => Ok(None),
    }
}

/// Split a store key into optional scheme and normalized host.
///
/// `https://index.docker.io/v1/` → (`https`, `index.docker.io`)
fn split_key(key: &str) -> (Option<String>, String) {
    let (scheme, rest) = match key.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
        None => (None, key),
    };
    let host = rest.split('/').next().unwrap_or(rest);
    (scheme, normalize_registry(host))
}

/// Normalize registry names (e.g., "docker.io" and "registry-1.docker.io" → "index.docker.io").
fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    if r == "docker.io" || r == "registry-1.docker.io" {
        DOCKER_HUB.to_string()
    } else {
        r
    }
}

/// Key to write for a registry; Docker Hub keeps its legacy URL form.
fn storage_key(registry: &str) -> String {
    let host = normalize_registry(registry);
    if host == DOCKER_HUB {
        "https://index.docker.io/v1/".to_string()
    } else {
        host
    }
}

fn read_document(path: &Path) -> Result<serde_json::Value> {
    if !path.exists() {
        return Ok(serde_json::json!({}));
    }
    let data = std::fs::read_to_string(path).map_err(|e| SkiffError::CredentialStoreError {
        path: path.display().to_string(),
        message: format!("Failed to read: {}", e),
    })?;
    serde_json::from_str(&data).map_err(|e| SkiffError::CredentialStoreError {
        path: path.display().to_string(),
        message: format!("Failed to parse: {}", e),
    })
}

fn auths_object<'a>(
    doc: &'a mut serde_json::Value,
    path: &Path,
) -> Result<&'a mut serde_json::Map<String, serde_json::Value>> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| SkiffError::CredentialStoreError {
            path: path.display().to_string(),
            message: "top-level value is not an object".to_string(),
        })?;
    root.entry("auths")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .ok_or_else(|| SkiffError::CredentialStoreError {
            path: path.display().to_string(),
            message: "'auths' is not an object".to_string(),
        })
}

/// Remove every key naming `host`; returns how many were removed.
fn remove_registry_keys(auths: &mut serde_json::Map<String, serde_json::Value>, host: &str) -> usize {
    let keys: Vec<String> = auths
        .keys()
        .filter(|k| split_key(k).1 == host)
        .cloned()
        .collect();
    for key in &keys {
        auths.remove(key);
    }
    keys.len()
}

/// Save the document atomically (write tmp, rename).
fn write_document(path: &Path, doc: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SkiffError::CredentialStoreError {
            path: parent.display().to_string(),
            message: format!("Failed to create directory: {}", e),
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    let data = serde_json::to_string_pretty(doc)?;
    std::fs::write(&tmp_path, &data).map_err(|e| SkiffError::CredentialStoreError {
        path: tmp_path.display().to_string(),
        message: format!("Failed to write: {}", e),
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| SkiffError::CredentialStoreError {
        path: path.display().to_string(),
        message: format!("Failed to rename {}: {}", tmp_path.display(), e),
    })?;
    Ok(())
}
