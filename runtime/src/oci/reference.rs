//! Container image reference parsing.
//!
//! Splits references like `ghcr.io/org/app:1.4.2` into registry host,
//! repository path, tag and digest.

use shipwatch_core::error::{Result, WatchError};

/// Registry host assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag assumed when a reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, optionally with port (e.g. "ghcr.io", "registry.local:5000")
    pub registry: String,
    /// Repository path (e.g. "library/nginx", "org/app")
    pub repository: String,
    pub tag: Option<String>,
    /// Digest (e.g. "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference string.
    ///
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `traefik:v2.10` → docker.io/library/traefik:v2.10
    /// - `grafana/loki` → docker.io/grafana/loki:latest
    /// - `ghcr.io/org/app@sha256:..` → ghcr.io/org/app@sha256:..
    /// - `registry.local:5000/app:1` → registry.local:5000/app:1
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(WatchError::Parse("empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(WatchError::Parse(format!(
                        "invalid digest in '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let (name, tag) = split_tag(name_tag);
        let (registry, repository) = split_registry(name, reference)?;

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Tag, or `latest` for digest-only references.
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// `registry/repository[:tag][@digest]`
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
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_reference())
    }
}

/// Split `name[:tag]`; only a colon after the last `/` separates a tag,
/// so `host:port/app` keeps its port.
fn split_tag(name_tag: &str) -> (&str, Option<&str>) {
    let last_component_start = name_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name_tag[last_component_start..].rfind(':') {
        Some(colon) => {
            let split = last_component_start + colon;
            (&name_tag[..split], Some(&name_tag[split + 1..]))
        }
        None => (name_tag, None),
    }
}

/// A leading component with a dot, a port or `localhost` is a registry host.
fn split_registry(name: &str, reference: &str) -> Result<(String, String)> {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(WatchError::Parse(format!(
                    "empty repository in '{}'",
                    reference
                )));
            }
            return Ok((first.to_lowercase(), rest.to_string()));
        }
        return Ok((DEFAULT_REGISTRY.to_string(), name.to_string()));
    }
    Ok((DEFAULT_REGISTRY.to_string(), format!("library/{}", name)))
}
