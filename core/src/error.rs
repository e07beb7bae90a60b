use thiserror::Error;

/// Skiff error types
#[derive(Error, Debug)]
pub enum SkiffError {
    /// Image reference could not be parsed
    #[error("Invalid reference: {0}")]
    ReferenceError(String),

    /// Credential store could not be loaded or interpreted
    #[error("Credential store error: {path} - {message}")]
    CredentialStoreError { path: String, message: String },

    /// Login-capable client could not be constructed or authenticated
    #[error("Login error: {registry} - {message}")]
    LoginError { registry: String, message: String },

    /// Discovery probe against a registry failed
    #[error("Discovery failed: {registry} - {message}")]
    DiscoveryError { registry: String, message: String },

    /// Target composition failed
    #[error("Target error: {0}")]
    TargetError(String),

    /// HTTP transport could not be constructed
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Container registry protocol error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// Content did not hash to the digest it was described with
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for SkiffError {
    fn from(err: serde_json::Error) -> Self {
        SkiffError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SkiffError {
    fn from(err: serde_yaml::Error) -> Self {
        SkiffError::SerializationError(err.to_string())
    }
}

/// Result type alias for Skiff operations
pub type Result<T> = std::result::Result<T, SkiffError>;
