//! Container inspection seam.
//!
//! A [`ContainerSource`] lists the containers of one host and inspects their
//! images. [`to_container`] turns that raw view into the watched
//! [`Container`] the resolver works on.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipwatch_core::error::Result;
use shipwatch_core::model::{Container, DigestInfo, Image, RegistryRef, TagInfo, UpdateResult};

use super::labels::WatchLabels;
use crate::oci::ImageReference;
use crate::resolver::{parse_semver, transform_tag};
use crate::registry::UNKNOWN_REGISTRY;

/// One container as listed by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    /// Image reference the container was started from (may be an image id).
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// First name without the leading `/`.
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .filter(|n| !n.is_empty())
            .unwrap_or("unknown")
    }
}

/// Image details as returned by the host's image inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageDetails {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub repo_digests: Vec<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

impl ImageDetails {
    /// Digest part of the first `name@sha256:...` repo digest.
    pub fn repo_digest(&self) -> Option<String> {
        self.repo_digests
            .first()
            .and_then(|d| d.split_once('@'))
            .map(|(_, digest)| digest.to_string())
    }
}

/// Read access to the containers of one host.
#[async_trait]
pub trait ContainerSource: Send + Sync {
    /// Host label used in logs and snapshot keys.
    fn host(&self) -> &str;

    /// Running containers, or every container when `all` is set.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Inspect the image a container runs.
    async fn get_container_image(&self, container: &ContainerSummary) -> Result<ImageDetails>;
}

/// Build the watched container from its listing and image details.
///
/// Returns `None` when the container was started from a bare image id and
/// the image has no repo tag to resolve against.
pub fn to_container(
    watcher: &str,
    summary: &ContainerSummary,
    details: &ImageDetails,
) -> Result<Option<Container>> {
    let labels = WatchLabels::from_labels(&summary.labels);

    let reference = if summary.image.contains("sha256:") {
        match details.repo_tags.first() {
            Some(tag) => tag.clone(),
            None => {
                tracing::warn!(
                    container = %summary.display_name(),
                    image = %summary.image,
                    "Cannot get a reliable tag for this image"
                );
                return Ok(None);
            }
        }
    } else {
        summary.image.clone()
    };
    let parsed = ImageReference::parse(&reference)?;
    let tag = parsed.tag_or_default().to_string();

    let semver = parse_semver(&transform_tag(labels.transform_tags.as_deref(), &tag)).is_some();
    let watch_digest = labels.is_digest_watched(semver);
    if !semver && !watch_digest {
        tracing::warn!(
            container = %summary.display_name(),
            image = %reference,
            "Tag is not semver and digest watching is disabled; no update will ever be reported"
        );
    }

    Ok(Some(Container {
        id: summary.id.clone(),
        name: summary.display_name().to_string(),
        watcher: watcher.to_string(),
        status: summary.state.clone(),
        include_tags: labels.include_tags,
        exclude_tags: labels.exclude_tags,
        transform_tags: labels.transform_tags,
        link_template: labels.link_template,
        display_name: labels.display_name,
        image: Image {
            id: details.id.clone(),
            name: parsed.repository,
            registry: RegistryRef {
                name: UNKNOWN_REGISTRY.to_string(),
                url: parsed.registry,
            },
            digest: DigestInfo {
                watch: watch_digest,
                repo: details.repo_digest(),
                value: None,
            },
            tag: TagInfo { value: tag.clone(), semver },
            os: details.os.clone(),
            architecture: details.architecture.clone(),
            variant: details.variant.iter().cloned().collect(),
            created: details.created.clone(),
        },
        result: Some(UpdateResult {
            tag,
            ..Default::default()
        }),
        ..Default::default()
    }))
}
