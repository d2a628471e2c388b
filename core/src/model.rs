//! Data model shared by the watcher, resolver and trigger layers.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, WatchError};

/// Registry that owns an image, as known after normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    /// `type.name` of the owning registry provider, `unknown` when none matched.
    pub name: String,
    /// Registry v2 API root once normalized (`https://<host>/v2`), bare host before.
    pub url: String,
}

/// Digest tracking for an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestInfo {
    pub watch: bool,
    /// Repo digest the local image was pulled with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Reference digest used for comparison with the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    pub value: String,
    pub semver: bool,
}

/// Image reference of a running container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    /// Repository path without host, e.g. `library/nginx`.
    pub name: String,
    pub registry: RegistryRef,
    pub digest: DigestInfo,
    pub tag: TagInfo,
    pub os: String,
    pub architecture: String,
    #[serde(default)]
    pub variant: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl Image {
    /// First platform variant, if any.
    pub fn primary_variant(&self) -> Option<&str> {
        self.variant.first().map(String::as_str)
    }
}

/// What the registry offers for a container's image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// Error marker attached to a container whose resolution failed this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&WatchError> for ContainerError {
    fn from(err: &WatchError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Size of a semver jump between local and remote tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemverDiff {
    Unknown,
    Prerelease,
    Patch,
    Minor,
    Major,
}

impl SemverDiff {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemverDiff::Unknown => "unknown",
            SemverDiff::Prerelease => "prerelease",
            SemverDiff::Patch => "patch",
            SemverDiff::Minor => "minor",
            SemverDiff::Major => "major",
        }
    }
}

/// Classification of an available update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UpdateKind {
    #[default]
    Unknown,
    Tag {
        local_value: String,
        remote_value: String,
        semver_diff: SemverDiff,
    },
    Digest {
        local_value: Option<String>,
        remote_value: Option<String>,
    },
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Unknown => "unknown",
            UpdateKind::Tag { .. } => "tag",
            UpdateKind::Digest { .. } => "digest",
        }
    }

    pub fn local_value(&self) -> Option<&str> {
        match self {
            UpdateKind::Unknown => None,
            UpdateKind::Tag { local_value, .. } => Some(local_value),
            UpdateKind::Digest { local_value, .. } => local_value.as_deref(),
        }
    }

    pub fn remote_value(&self) -> Option<&str> {
        match self {
            UpdateKind::Unknown => None,
            UpdateKind::Tag { remote_value, .. } => Some(remote_value),
            UpdateKind::Digest { remote_value, .. } => remote_value.as_deref(),
        }
    }

    pub fn semver_diff(&self) -> Option<SemverDiff> {
        match self {
            UpdateKind::Tag { semver_diff, .. } => Some(*semver_diff),
            _ => None,
        }
    }
}

/// A watched container and its latest resolution outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    /// Name of the watcher that discovered the container.
    pub watcher: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub image: Image,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<UpdateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ContainerError>,
    #[serde(default)]
    pub update_available: bool,
    #[serde(default)]
    pub update_kind: UpdateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Container {
    /// `watcher_name`, unique across hosts.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.watcher, self.name)
    }

    /// Display name, falling back to the container name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Whether the registry result differs from `other`'s.
    pub fn has_result_changed(&self, other: &Container) -> bool {
        let mine = self.result.as_ref();
        let theirs = other.result.as_ref();
        mine.map(|r| &r.tag) != theirs.map(|r| &r.tag)
            || mine.and_then(|r| r.digest.as_ref()) != theirs.and_then(|r| r.digest.as_ref())
            || mine.and_then(|r| r.created.as_ref()) != theirs.and_then(|r| r.created.as_ref())
    }
}

/// Per-container diff outcome of one watch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub changed: bool,
    pub container: Container,
    /// Container was present in the previous snapshot but is gone now.
    #[serde(default)]
    pub removed: bool,
}

/// Counters for one completed watch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub watched: usize,
    pub errors: usize,
    pub updates: usize,
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} containers watched, {} errors, {} available updates",
            self.watched, self.errors, self.updates
        )
    }
}

/// How a registry provider attaches credentials to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Basic,
    Bearer,
}

/// One configured registry credential set, with secrets masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDescriptor {
    /// `type.name`
    pub name: String,
    /// Provider type (`hub`, `ecr`, ...).
    pub provider: String,
    /// Registered implicitly as an anonymous fallback.
    pub default: bool,
    /// Configured explicitly and meant to be persisted by the host application.
    pub persist: bool,
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_scheme: Option<AuthScheme>,
}
