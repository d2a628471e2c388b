//! Registry v2 API calls shared by every provider.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::Image;

use super::{check_status, RegistryProvider};
use crate::http::{HttpClient, HttpResponse, RequestOptions};
use crate::oci::manifest::{self, ManifestDocument, TagList};

/// Page size requested from `tags/list` (not honoured by every registry).
const TAGS_PAGE_SIZE: usize = 1000;

/// Digest of the manifest a tag currently points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDigest {
    pub digest: Option<String>,
    /// 2 for a manifest digest, 1 for an image config digest or a schema-1 manifest.
    pub version: u8,
    pub created: Option<String>,
}

/// Authenticated registry API access through one provider.
pub struct RegistryClient {
    provider: Arc<dyn RegistryProvider>,
    http: Arc<dyn HttpClient>,
}

impl RegistryClient {
    pub fn new(provider: Arc<dyn RegistryProvider>) -> Self {
        let http = Arc::clone(provider.http());
        Self { provider, http }
    }

    pub fn provider(&self) -> &Arc<dyn RegistryProvider> {
        &self.provider
    }

    /// Authenticate, send, and reject non-2xx responses.
    pub async fn call_registry(&self, image: &Image, options: RequestOptions) -> Result<HttpResponse> {
        let url = options.url.clone();
        tracing::debug!(registry = %self.provider.id(), method = options.method.as_str(), url = %url, "Calling registry");
        let options = self.provider.authenticate(image, options).await?;
        let response = self.http.request(options).await?;
        check_status(response, &image.registry.name, &url)
    }

    /// Every tag of the image's repository, in registry order.
    ///
    /// Follows `Link` pagination with `?n=1000&last=<last tag of previous page>`.
    pub async fn get_tags(&self, image: &Image) -> Result<Vec<String>> {
        tracing::debug!(registry = %self.provider.id(), image = %image.name, "Listing tags");
        let mut tags: Vec<String> = Vec::new();
        let mut last: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/{}/tags/list?n={}",
                image.registry.url, image.name, TAGS_PAGE_SIZE
            );
            if let Some(ref last) = last {
                url.push_str("&last=");
                url.push_str(last);
            }
            let response = self
                .call_registry(image, RequestOptions::get(url).header("accept", "application/json"))
                .await?;
            let has_next = response.header("link").is_some();
            let page: TagList = response.json()?;
            let page_tags = page.tags.unwrap_or_default();

            let page_last = page_tags.last().cloned();
            tags.extend(page_tags);
            if !has_next || page_last.is_none() || page_last == last {
                break;
            }
            last = page_last;
        }

        Ok(tags)
    }

    /// Resolve the digest for `digest` (or the image's tag when `None`).
    ///
    /// Manifest lists and OCI indexes are narrowed to the image's platform,
    /// then the platform manifest digest is read from `Docker-Content-Digest`.
    /// Single manifests yield their config digest; schema-1 manifests yield
    /// the legacy image id and creation date.
    pub async fn get_image_manifest_digest(
        &self,
        image: &Image,
        digest: Option<&str>,
    ) -> Result<ManifestDigest> {
        let reference = digest.unwrap_or(&image.tag.value);
        let url = format!("{}/{}/manifests/{}", image.registry.url, image.name, reference);
        let accept = format!(
            "{}, {}, {}",
            manifest::manifest_list_accept(),
            manifest::MEDIA_TYPE_DOCKER_MANIFEST,
            manifest::MEDIA_TYPE_OCI_MANIFEST
        );
        let response = self
            .call_registry(image, RequestOptions::get(&url).header("accept", accept))
            .await?;
        let document: ManifestDocument = response.json()?;

        let (found_digest, found_media_type) = match document.schema_version {
            1 => {
                let v1 = document.v1_compatibility().ok_or_else(|| {
                    WatchError::Parse(format!("schema 1 manifest without history at {}", url))
                })?;
                return Ok(ManifestDigest {
                    digest: v1.config.and_then(|c| c.image),
                    version: 1,
                    created: v1.created,
                });
            }
            2 => match document.effective_media_type() {
                Some(media_type) if manifest::is_index(media_type) => {
                    let selected = document
                        .select_platform(&image.os, &image.architecture, image.primary_variant())
                        .ok_or_else(|| {
                            WatchError::Parse(format!(
                                "no manifest for {}/{} in {}",
                                image.os, image.architecture, url
                            ))
                        })?;
                    tracing::debug!(digest = %selected.digest, "Platform manifest selected");
                    (
                        selected.digest.clone(),
                        selected
                            .media_type
                            .clone()
                            .unwrap_or_else(|| manifest::MEDIA_TYPE_OCI_MANIFEST.to_string()),
                    )
                }
                Some(media_type) if manifest::is_manifest(media_type) => {
                    let config = document.config.as_ref().ok_or_else(|| {
                        WatchError::Parse(format!("manifest without config at {}", url))
                    })?;
                    (
                        config.digest.clone(),
                        config
                            .media_type
                            .clone()
                            .unwrap_or_else(|| manifest::MEDIA_TYPE_OCI_CONFIG.to_string()),
                    )
                }
                other => {
                    return Err(WatchError::Parse(format!(
                        "unexpected manifest media type {:?} at {}",
                        other, url
                    )))
                }
            },
            other => {
                return Err(WatchError::Parse(format!(
                    "unsupported manifest schema version {} at {}",
                    other, url
                )))
            }
        };

        if manifest::is_manifest(&found_media_type) {
            let head_url = format!(
                "{}/{}/manifests/{}",
                image.registry.url, image.name, found_digest
            );
            let response = self
                .call_registry(
                    image,
                    RequestOptions::head(&head_url).header("accept", found_media_type.as_str()),
                )
                .await?;
            let digest = response.header("docker-content-digest").ok_or_else(|| {
                WatchError::Parse(format!("no Docker-Content-Digest header from {}", head_url))
            })?;
            return Ok(ManifestDigest {
                digest: Some(digest.to_string()),
                version: 2,
                created: None,
            });
        }

        if manifest::is_config(&found_media_type) {
            return Ok(ManifestDigest {
                digest: Some(found_digest),
                version: 1,
                created: None,
            });
        }

        Err(WatchError::Parse(format!(
            "no usable manifest found at {}",
            url
        )))
    }

    /// `host/name:tag` or `host/name@digest`.
    pub fn get_image_full_name(image: &Image, tag_or_digest: &str) -> String {
        let separator = if tag_or_digest.contains(':') { '@' } else { ':' };
        let registry = image
            .registry
            .url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .replacen("/v2", "", 1);
        format!("{}/{}{}{}", registry, image.name, separator, tag_or_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::registry::test_util::{image, provider};
    use serde_json::json;

    const ROOT: &str = "https://registry.example.org/v2";

    fn client() -> (RegistryClient, crate::testing::StubHttpClient, Image) {
        let (custom, stub) = provider("custom", "corp", json!({"url": "https://registry.example.org"}));
        let normalized = custom.normalize_image(&image("registry.example.org", "team/app"));
        (RegistryClient::new(custom), stub, normalized)
    }

    fn ok(body: serde_json::Value) -> HttpResponse {
        HttpResponse::new(200, body.to_string())
    }

    #[tokio::test]
    async fn test_get_tags_single_page() {
        let (client, stub, image) = client();
        stub.on(
            Method::Get,
            &format!("{}/team/app/tags/list?n=1000", ROOT),
            ok(json!({"name": "team/app", "tags": ["1.0.0", "1.1.0", "latest"]})),
        );
        let tags = client.get_tags(&image).await.unwrap();
        assert_eq!(tags, vec!["1.0.0", "1.1.0", "latest"]);
    }

    #[tokio::test]
    async fn test_get_tags_follows_link_pagination() {
        let (client, stub, image) = client();
        stub.on(
            Method::Get,
            &format!("{}/team/app/tags/list?n=1000", ROOT),
            ok(json!({"tags": ["1.0.0", "1.1.0"]}))
                .with_header("Link", "</v2/team/app/tags/list?n=1000&last=1.1.0>; rel=\"next\""),
        );
        stub.on(
            Method::Get,
            &format!("{}/team/app/tags/list?n=1000&last=1.1.0", ROOT),
            ok(json!({"tags": ["2.0.0"]})),
        );
        let tags = client.get_tags(&image).await.unwrap();
        assert_eq!(tags, vec!["1.0.0", "1.1.0", "2.0.0"]);
    }

    #[tokio::test]
    async fn test_get_tags_null_tags_is_empty() {
        let (client, stub, image) = client();
        stub.on(
            Method::Get,
            &format!("{}/team/app/tags/list?n=1000", ROOT),
            ok(json!({"name": "team/app", "tags": null})),
        );
        assert!(client.get_tags(&image).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_tags_unauthorized() {
        let (client, stub, image) = client();
        stub.on(
            Method::Get,
            &format!("{}/team/app/tags/list?n=1000", ROOT),
            HttpResponse::new(401, ""),
        );
        assert!(matches!(
            client.get_tags(&image).await,
            Err(WatchError::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn test_manifest_digest_from_index() {
        let (client, stub, image) = client();
        stub.on(
            Method::Get,
            &format!("{}/team/app/manifests/1.0.0", ROOT),
            ok(json!({
                "schemaVersion": 2,
                "mediaType": manifest::MEDIA_TYPE_DOCKER_MANIFEST_LIST,
                "manifests": [
                    {"mediaType": manifest::MEDIA_TYPE_DOCKER_MANIFEST, "digest": "sha256:arm",
                     "platform": {"architecture": "arm64", "os": "linux"}},
                    {"mediaType": manifest::MEDIA_TYPE_DOCKER_MANIFEST, "digest": "sha256:amd",
                     "platform": {"architecture": "amd64", "os": "linux"}}
                ]
            })),
        );
        stub.on(
            Method::Head,
            &format!("{}/team/app/manifests/sha256:amd", ROOT),
            HttpResponse::new(200, "").with_header("Docker-Content-Digest", "sha256:amd-manifest"),
        );

        let digest = client.get_image_manifest_digest(&image, None).await.unwrap();
        assert_eq!(digest.digest.as_deref(), Some("sha256:amd-manifest"));
        assert_eq!(digest.version, 2);

        let head = stub.requests_to(&format!("{}/team/app/manifests/sha256:amd", ROOT));
        assert_eq!(head[0].get_header("accept"), Some(manifest::MEDIA_TYPE_DOCKER_MANIFEST));
    }

    #[tokio::test]
    async fn test_manifest_digest_single_manifest_uses_config() {
        let (client, stub, image) = client();
        stub.on(
            Method::Get,
            &format!("{}/team/app/manifests/1.0.0", ROOT),
            ok(json!({
                "schemaVersion": 2,
                "mediaType": manifest::MEDIA_TYPE_DOCKER_MANIFEST,
                "config": {"mediaType": manifest::MEDIA_TYPE_DOCKER_CONFIG, "digest": "sha256:cfg"}
            })),
        );
        let digest = client.get_image_manifest_digest(&image, None).await.unwrap();
        assert_eq!(digest.digest.as_deref(), Some("sha256:cfg"));
        assert_eq!(digest.version, 1);
    }

    #[tokio::test]
    async fn test_manifest_digest_schema1() {
        let (client, stub, image) = client();
        stub.on(
            Method::Get,
            &format!("{}/team/app/manifests/sha256:repo", ROOT),
            ok(json!({
                "schemaVersion": 1,
                "history": [{"v1Compatibility": "{\"config\":{\"Image\":\"sha256:old\"},\"created\":\"2019-05-01T10:00:00Z\"}"}]
            })),
        );
        let digest = client
            .get_image_manifest_digest(&image, Some("sha256:repo"))
            .await
            .unwrap();
        assert_eq!(digest.digest.as_deref(), Some("sha256:old"));
        assert_eq!(digest.created.as_deref(), Some("2019-05-01T10:00:00Z"));
        assert_eq!(digest.version, 1);
    }

    #[tokio::test]
    async fn test_manifest_digest_no_platform_match() {
        let (client, stub, mut image) = client();
        image.architecture = "s390x".to_string();
        stub.on(
            Method::Get,
            &format!("{}/team/app/manifests/1.0.0", ROOT),
            ok(json!({
                "schemaVersion": 2,
                "mediaType": manifest::MEDIA_TYPE_OCI_INDEX,
                "manifests": [{"digest": "sha256:amd", "platform": {"architecture": "amd64", "os": "linux"}}]
            })),
        );
        assert!(matches!(
            client.get_image_manifest_digest(&image, None).await,
            Err(WatchError::Parse(_))
        ));
    }

    #[test]
    fn test_get_image_full_name() {
        let (_, _, image) = client();
        assert_eq!(
            RegistryClient::get_image_full_name(&image, "1.2.0"),
            "registry.example.org/team/app:1.2.0"
        );
        assert_eq!(
            RegistryClient::get_image_full_name(&image, "sha256:abc"),
            "registry.example.org/team/app@sha256:abc"
        );
    }
}
