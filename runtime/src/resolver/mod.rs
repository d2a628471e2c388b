//! Image resolution: from a container's current image to its best update.
//!
//! The resolver picks the provider that owns the image's registry, lists
//! the repository's tags, reduces them to update candidates and, when the
//! image is digest-watched, compares manifest digests so that rebuilt
//! mutable tags (`latest`, `8`) are detected too.

pub mod tag;
pub mod update;

pub use tag::{parse_semver, tag_candidates, transform_tag, TagFilter};
pub use update::{is_update_available, refresh_derived, update_kind};

use std::sync::Arc;

use shipwatch_core::component::ComponentRegistry;
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::{Container, Image, UpdateResult};

use crate::registry::{self, RegistryClient, RegistryProvider};

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub result: UpdateResult,
    /// Digest of what the container runs, when digest watching needed it.
    pub local_digest: Option<String>,
    pub candidates: Vec<String>,
}

/// Resolves containers against the registered registry providers.
#[derive(Clone)]
pub struct ImageResolver {
    registries: Arc<ComponentRegistry<dyn RegistryProvider>>,
}

impl ImageResolver {
    pub fn new(registries: Arc<ComponentRegistry<dyn RegistryProvider>>) -> Self {
        Self { registries }
    }

    pub fn providers(&self) -> Vec<Arc<dyn RegistryProvider>> {
        self.registries.list()
    }

    /// Point the image at the first matching provider.
    pub fn normalize(&self, image: &Image) -> Image {
        registry::normalize_with(&self.providers(), image)
    }

    /// Client for the provider that normalized the image.
    pub fn client_for(&self, image: &Image) -> Result<RegistryClient> {
        self.registries
            .find(|p| p.base().registry_name() == image.registry.name)
            .map(RegistryClient::new)
            .ok_or_else(|| WatchError::UnsupportedRegistry(image.registry.name.clone()))
    }

    /// Best update for the container's image.
    ///
    /// Semver images move to the highest greater candidate. Digest-watched
    /// images also get the remote digest of that tag (or of the current tag)
    /// and the local digest it is compared against.
    pub async fn find_new_version(&self, container: &Container) -> Result<Resolution> {
        let image = &container.image;
        let client = self.client_for(image)?;

        let tags = client.get_tags(image).await?;
        tracing::debug!(image = %image.name, count = tags.len(), "Tags listed");
        let candidates = tag_candidates(container, &tags)?;

        let mut result = UpdateResult {
            tag: image.tag.value.clone(),
            digest: None,
            created: None,
        };
        if image.tag.semver {
            if let Some(best) = candidates.first() {
                result.tag = best.clone();
            }
        }

        let mut local_digest = None;
        if image.digest.watch {
            if let Some(repo_digest) = image.digest.repo.as_deref() {
                let mut target = image.clone();
                target.tag.value = result.tag.clone();
                let remote = client.get_image_manifest_digest(&target, None).await?;
                result.digest = remote.digest;
                result.created = remote.created;

                local_digest = if remote.version == 2 {
                    client
                        .get_image_manifest_digest(image, Some(repo_digest))
                        .await?
                        .digest
                } else {
                    Some(image.id.clone()).filter(|id| !id.is_empty())
                };
            }
        }

        Ok(Resolution {
            result,
            local_digest,
            candidates,
        })
    }

    /// Apply a fresh resolution to the container and recompute its
    /// derived update fields.
    pub async fn resolve(&self, mut container: Container) -> Result<Container> {
        let resolution = self.find_new_version(&container).await?;
        if resolution.local_digest.is_some() {
            container.image.digest.value = resolution.local_digest;
        }
        container.result = Some(resolution.result);
        container.error = None;
        refresh_derived(&mut container);
        Ok(container)
    }
}
