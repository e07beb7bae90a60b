//! Skiff Registry - OCI registry resolver construction.
//!
//! Turns a reference plus [`RegistryOptions`] into a resolver handle:
//!
//! ```text
//! RegistryOptions ─▶ resolve_credentials ─▶ OciResolver ─┬─▶ Registry (base)
//!                    (explicit │ store │ anonymous)       ├─▶ with_discover ─▶ Registry (discovered)
//!                                                         └─▶ RemoteTarget (login client + backup)
//! ```
//!
//! [`RegistryOptions`]: skiff_core::RegistryOptions

#![allow(clippy::result_large_err)]

pub mod auth;
pub mod credentials;
pub mod discovery;
pub mod login;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod target;
pub mod transport;

// Re-export common types
pub use auth::{
    resolve_credentials, AnonymousCredentials, CredentialRequest, CredentialResolution,
    CredentialSource, CredentialSourceKind, RegistryAuth, StaticCredentials,
};
pub use credentials::{default_config_path, CredentialStore, StoreCredentials};
pub use discovery::{with_discover, ApiVersionProbe, Discoverer, DiscoveryResolver, Endpoint};
pub use login::{LoginClient, LoginOptions};
pub use reference::{ImageReference, ReferenceSpec};
pub use registry::{
    new_registry, new_registry_target, new_registry_with_discover, new_registry_with_discoverer,
    Registry, RegistryState,
};
pub use resolver::{new_resolver, Descriptor, OciResolver, Resolver};
pub use target::{RemoteTarget, Target};
pub use transport::{TlsVerification, TransportConfig};
