//! Registry v2 API payloads: tag lists, manifests, manifest lists and indexes.

use serde::Deserialize;

pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

/// `Accept` header sent when fetching a manifest by tag.
pub fn manifest_list_accept() -> String {
    format!("{}, {}", MEDIA_TYPE_DOCKER_MANIFEST_LIST, MEDIA_TYPE_OCI_INDEX)
}

pub fn is_index(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_DOCKER_MANIFEST_LIST || media_type == MEDIA_TYPE_OCI_INDEX
}

pub fn is_manifest(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_DOCKER_MANIFEST || media_type == MEDIA_TYPE_OCI_MANIFEST
}

pub fn is_config(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_DOCKER_CONFIG || media_type == MEDIA_TYPE_OCI_CONFIG
}

/// `GET /v2/<name>/tags/list`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagList {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Any manifest-shaped document (schema 1, schema 2, list or index).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<PlatformManifest>,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ManifestDocument {
    /// Declared media type, inferred from the body when absent.
    pub fn effective_media_type(&self) -> Option<&str> {
        match self.media_type.as_deref() {
            Some(media_type) => Some(media_type),
            None if !self.manifests.is_empty() => Some(MEDIA_TYPE_OCI_INDEX),
            None if self.config.is_some() => Some(MEDIA_TYPE_OCI_MANIFEST),
            None => None,
        }
    }

    /// Pick the entry for a platform.
    ///
    /// The first os + architecture match wins unless several match and one
    /// of them also matches `variant`.
    pub fn select_platform(
        &self,
        os: &str,
        architecture: &str,
        variant: Option<&str>,
    ) -> Option<&PlatformManifest> {
        let matching: Vec<&PlatformManifest> = self
            .manifests
            .iter()
            .filter(|m| {
                m.platform
                    .as_ref()
                    .is_some_and(|p| p.os == os && p.architecture == architecture)
            })
            .collect();

        if matching.len() > 1 {
            if let Some(exact) = matching.iter().find(|m| {
                m.platform.as_ref().and_then(|p| p.variant.as_deref()) == variant
            }) {
                return Some(exact);
            }
        }
        matching.first().copied()
    }

    /// Parsed `v1Compatibility` of the newest history entry (schema 1).
    pub fn v1_compatibility(&self) -> Option<V1Compatibility> {
        self.history
            .first()
            .and_then(|h| serde_json::from_str(&h.v1_compatibility).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: Option<String>,
    pub digest: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformManifest {
    #[serde(default)]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Compatibility {
    #[serde(default)]
    pub config: Option<V1Config>,
    #[serde(default)]
    pub created: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Config {
    #[serde(rename = "Image", default)]
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ManifestDocument {
        serde_json::from_value(serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_OCI_INDEX,
            "manifests": [
                {"mediaType": MEDIA_TYPE_OCI_MANIFEST, "digest": "sha256:amd64",
                 "platform": {"architecture": "amd64", "os": "linux"}},
                {"mediaType": MEDIA_TYPE_OCI_MANIFEST, "digest": "sha256:armv6",
                 "platform": {"architecture": "arm", "os": "linux", "variant": "v6"}},
                {"mediaType": MEDIA_TYPE_OCI_MANIFEST, "digest": "sha256:armv7",
                 "platform": {"architecture": "arm", "os": "linux", "variant": "v7"}},
                {"mediaType": "application/vnd.in-toto+json", "digest": "sha256:att"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_select_single_match() {
        let doc = index();
        assert_eq!(
            doc.select_platform("linux", "amd64", None).unwrap().digest,
            "sha256:amd64"
        );
    }

    #[test]
    fn test_select_refines_on_variant() {
        let doc = index();
        assert_eq!(
            doc.select_platform("linux", "arm", Some("v7")).unwrap().digest,
            "sha256:armv7"
        );
        // No variant match: first os/arch match
        assert_eq!(
            doc.select_platform("linux", "arm", Some("v8")).unwrap().digest,
            "sha256:armv6"
        );
    }

    #[test]
    fn test_select_no_match() {
        assert!(index().select_platform("windows", "amd64", None).is_none());
    }

    #[test]
    fn test_effective_media_type_inferred() {
        let doc: ManifestDocument = serde_json::from_value(serde_json::json!({
            "schemaVersion": 2,
            "config": {"mediaType": MEDIA_TYPE_OCI_CONFIG, "digest": "sha256:cfg"}
        }))
        .unwrap();
        assert_eq!(doc.effective_media_type(), Some(MEDIA_TYPE_OCI_MANIFEST));
    }

    #[test]
    fn test_schema1_history() {
        let doc: ManifestDocument = serde_json::from_value(serde_json::json!({
            "schemaVersion": 1,
            "history": [
                {"v1Compatibility": "{\"config\":{\"Image\":\"sha256:legacy\"},\"created\":\"2021-01-01T00:00:00Z\"}"}
            ]
        }))
        .unwrap();
        let v1 = doc.v1_compatibility().unwrap();
        assert_eq!(v1.config.unwrap().image.as_deref(), Some("sha256:legacy"));
        assert_eq!(v1.created.as_deref(), Some("2021-01-01T00:00:00Z"));
    }

    #[test]
    fn test_media_type_predicates() {
        assert!(is_index(MEDIA_TYPE_DOCKER_MANIFEST_LIST));
        assert!(is_manifest(MEDIA_TYPE_DOCKER_MANIFEST));
        assert!(is_config(MEDIA_TYPE_OCI_CONFIG));
        assert!(!is_config(MEDIA_TYPE_OCI_MANIFEST));
    }
}
