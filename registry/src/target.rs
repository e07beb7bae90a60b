//! Push-capable registry targets.

use std::sync::Arc;

use async_trait::async_trait;
use skiff_core::error::{Result, SkiffError};

use crate::discovery::{ApiVersionProbe, Discoverer, Endpoint};
use crate::login::LoginClient;
use crate::reference::ImageReference;
use crate::resolver::{Descriptor, Resolver};

/// A resolver that can also push content and discover its endpoint.
#[async_trait]
pub trait Target: Resolver {
    /// Upload `content` described by `descriptor`. Returns the registry location.
    async fn push(
        &self,
        reference: &ImageReference,
        descriptor: &Descriptor,
        content: Vec<u8>,
    ) -> Result<String>;

    /// Probe the endpoint serving `reference`.
    async fn discover(&self, reference: &ImageReference) -> Result<Endpoint>;
}

/// Target backed by a login client, with a backup resolver for reads.
pub struct RemoteTarget {
    reference: ImageReference,
    login: LoginClient,
    backup: Arc<dyn Resolver>,
}

impl std::fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("reference", &self.reference)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl RemoteTarget {
    /// Build a target for `target_ref` using `login` for writes.
    ///
    /// The reference's registry must match the login client's host.
    pub fn from_remotes_registry(
        target_ref: &str,
        login: LoginClient,
        backup: Arc<dyn Resolver>,
    ) -> Result<Self> {
        let reference = ImageReference::parse(target_ref)
            .map_err(|e| SkiffError::TargetError(format!("{}: {}", target_ref, e)))?;

        if reference.registry != login.host() {
            return Err(SkiffError::TargetError(format!(
                "Reference registry {} does not match login host {}",
                reference.registry,
                login.host()
            )));
        }

        Ok(Self {
            reference,
            login,
            backup,
        })
    }

    /// The reference this target was built for.
    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    pub fn login_client(&self) -> &LoginClient {
        &self.login
    }
}

#[async_trait]
impl Resolver for RemoteTarget {
    async fn resolve(&self, reference: &ImageReference) -> Result<Descriptor> {
        match self.login.resolver().resolve(reference).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => {
                tracing::debug!(reference = %reference, error = %e, "Target resolve failed, using backup resolver");
                self.backup.resolve(reference).await
            }
        }
    }

    async fn fetch(&self, reference: &ImageReference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        match self.login.resolver().fetch(reference, descriptor).await {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::debug!(
                    reference = %reference,
                    digest = %descriptor.digest,
                    error = %e,
                    "Target fetch failed, using backup resolver"
                );
                self.backup.fetch(reference, descriptor).await
            }
        }
    }
}

#[async_trait]
impl Target for RemoteTarget {
    async fn push(
        &self,
        reference: &ImageReference,
        descriptor: &Descriptor,
        content: Vec<u8>,
    ) -> Result<String> {
        if reference.registry != self.login.host() {
            return Err(SkiffError::TargetError(format!(
                "Cannot push {} through target for {}",
                reference,
                self.login.host()
            )));
        }
        self.login.resolver().push(reference, descriptor, content).await
    }

    async fn discover(&self, reference: &ImageReference) -> Result<Endpoint> {
        ApiVersionProbe
            .probe(reference, self.login.resolver().transport())
            .await
    }
}
