//! Registry providers.
//!
//! One provider per registry family. Each decides from an image's registry
//! host whether it is responsible (`match_image`), rewrites the registry to
//! its v2 API root (`normalize_image`) and attaches credentials to outgoing
//! requests (`authenticate`). Providers are selected by `match_image` alone,
//! so adding one never touches the watcher or the resolver.
//!
//! ```text
//! Image{registry.url = "ghcr.io"} ──match──► Ghcr ──normalize──► Image{registry = ghcr.public, https://ghcr.io/v2}
//!                                                  └─authenticate─► RequestOptions + Authorization
//! ```

mod acr;
pub mod challenge;
pub mod client;
mod custom;
mod ecr;
mod gcr;
mod ghcr;
mod gitea;
mod gitlab;
mod hub;
mod lscr;
mod quay;
pub mod sigv4;

pub use client::{ManifestDigest, RegistryClient};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use shipwatch_core::component::{Component, ComponentConfig, ComponentIdentity, ConfigSchema, RawConfig};
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::{AuthScheme, Image, RegistryDescriptor};

use crate::http::{HttpClient, HttpResponse, RequestOptions};

/// Registry name given to images no provider matched.
pub const UNKNOWN_REGISTRY: &str = "unknown";

/// Provider types known to the factory.
pub const PROVIDER_TYPES: &[&str] = &[
    "acr", "custom", "ecr", "gcr", "ghcr", "gitea", "gitlab", "hub", "lscr", "quay",
];

/// Anonymous instances registered when no instance of the type is configured.
pub const DEFAULT_PROVIDERS: &[(&str, &str)] = &[
    ("hub", "public"),
    ("ghcr", "public"),
    ("quay", "public"),
    ("ecr", "public"),
];

/// Credentials a container runtime can use to pull from a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullCredentials {
    pub username: String,
    pub password: String,
}

/// Shared collaborators handed to every provider at construction.
#[derive(Clone)]
pub struct ProviderContext {
    pub http: Arc<dyn HttpClient>,
    pub auth_timeout: Duration,
}

/// Capability interface implemented by every registry family.
#[async_trait]
pub trait RegistryProvider: Component {
    /// State shared by all providers.
    fn base(&self) -> &ProviderBase;

    /// Whether this provider is responsible for the image's registry.
    fn match_image(&self, image: &Image) -> bool;

    /// Point the image at the provider's v2 API root and tag it with the
    /// provider's `type.name`. Idempotent; never alters `image.name`.
    fn normalize_image(&self, image: &Image) -> Image;

    /// Attach credentials for `image` to an outgoing request.
    async fn authenticate(&self, image: &Image, options: RequestOptions) -> Result<RequestOptions>;

    /// Scheme used by `authenticate`, `None` for anonymous access.
    fn auth_scheme(&self) -> Option<AuthScheme>;

    /// Pull credentials, where the provider has them.
    fn auth_pull(&self) -> Option<PullCredentials> {
        None
    }

    /// Configuration with every credential field masked.
    fn mask_configuration(&self) -> RawConfig {
        self.base().config.masked()
    }

    fn http(&self) -> &Arc<dyn HttpClient> {
        &self.base().http
    }

    fn descriptor(&self) -> RegistryDescriptor {
        let base = self.base();
        RegistryDescriptor {
            name: base.identity.short_id(),
            provider: base.identity.type_name.clone(),
            default: base.default,
            persist: !base.default,
            config: serde_json::Value::Object(self.mask_configuration().into_iter().collect()),
            auth_scheme: self.auth_scheme(),
        }
    }
}

/// Identity, validated configuration and collaborators of one provider.
pub struct ProviderBase {
    pub identity: ComponentIdentity,
    pub config: ComponentConfig,
    pub http: Arc<dyn HttpClient>,
    pub auth_timeout: Duration,
    pub default: bool,
}

impl ProviderBase {
    pub fn new(identity: ComponentIdentity, config: ComponentConfig, ctx: &ProviderContext, default: bool) -> Self {
        Self {
            identity,
            config,
            http: Arc::clone(&ctx.http),
            auth_timeout: ctx.auth_timeout,
            default,
        }
    }

    /// Non-empty string setting.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.config.get_str(key).filter(|s| !s.trim().is_empty())
    }

    /// `type.name`
    pub fn registry_name(&self) -> String {
        self.identity.short_id()
    }

    /// Copy of `image` pointed at `https://<host>/v2` and owned by this provider.
    pub fn normalize_to(&self, image: &Image, host: &str) -> Image {
        let mut normalized = image.clone();
        normalized.registry.url = format!("https://{}/v2", host);
        normalized.registry.name = self.registry_name();
        normalized
    }

    /// Exchange credentials for a bearer token, bounded by the auth timeout.
    pub async fn fetch_token(&self, options: RequestOptions) -> Result<String> {
        let url = options.url.clone();
        let request = self.http.request(options.with_timeout(self.auth_timeout));
        let response = tokio::time::timeout(self.auth_timeout, request)
            .await
            .map_err(|_| WatchError::Timeout(format!("authentication against {}", url)))??;
        let response = check_status(response, &self.registry_name(), &url)?;

        let body: TokenResponse = response.json()?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| WatchError::Authentication {
                registry: self.registry_name(),
                message: format!("no token returned by {}", url),
            })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Map a non-2xx response to the error taxonomy.
pub fn check_status(response: HttpResponse, registry: &str, url: &str) -> Result<HttpResponse> {
    match response.status {
        s if (200..300).contains(&s) => Ok(response),
        401 | 403 => Err(WatchError::Authentication {
            registry: registry.to_string(),
            message: format!("{} returned HTTP {}", url, response.status),
        }),
        s => Err(WatchError::Registry {
            registry: registry.to_string(),
            message: format!("{} returned HTTP {}", url, s),
        }),
    }
}

/// Lowercase host (with port) of a registry URL or bare host.
pub fn registry_host(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// `repository:<name>:pull` token scope.
pub fn pull_scope(image: &Image) -> String {
    format!("repository:{}:pull", image.name)
}

/// Configuration schema for a provider type.
///
/// `ecr` validates credentials only when some are given; an empty
/// configuration selects anonymous access to the public gallery.
pub fn schema(type_name: &str, raw: &RawConfig) -> Result<ConfigSchema> {
    match type_name {
        "acr" => Ok(acr::Acr::schema()),
        "custom" => Ok(custom::Custom::schema()),
        "ecr" => Ok(ecr::Ecr::schema(raw)),
        "gcr" => Ok(gcr::Gcr::schema()),
        "ghcr" => Ok(ghcr::Ghcr::schema()),
        "gitea" => Ok(gitea::Gitea::schema()),
        "gitlab" => Ok(gitlab::Gitlab::schema()),
        "hub" => Ok(hub::Hub::schema()),
        "lscr" => Ok(lscr::Lscr::schema()),
        "quay" => Ok(quay::Quay::schema()),
        other => Err(WatchError::UnsupportedRegistry(other.to_string())),
    }
}

/// Construct a provider from a validated configuration.
pub fn build(
    identity: ComponentIdentity,
    config: ComponentConfig,
    ctx: &ProviderContext,
    default: bool,
) -> Result<Arc<dyn RegistryProvider>> {
    let type_name = identity.type_name.clone();
    let base = ProviderBase::new(identity, config, ctx, default);
    let provider: Arc<dyn RegistryProvider> = match type_name.as_str() {
        "acr" => Arc::new(acr::Acr::new(base)),
        "custom" => Arc::new(custom::Custom::new(base)),
        "ecr" => Arc::new(ecr::Ecr::new(base)),
        "gcr" => Arc::new(gcr::Gcr::new(base)),
        "ghcr" => Arc::new(ghcr::Ghcr::new(base)),
        "gitea" => Arc::new(gitea::Gitea::new(base)),
        "gitlab" => Arc::new(gitlab::Gitlab::new(base)),
        "hub" => Arc::new(hub::Hub::new(base)),
        "lscr" => Arc::new(lscr::Lscr::new(base)),
        "quay" => Arc::new(quay::Quay::new(base)),
        other => return Err(WatchError::UnsupportedRegistry(other.to_string())),
    };
    Ok(provider)
}

/// First provider whose `match_image` accepts the image.
pub fn find_provider<'a>(
    providers: &'a [Arc<dyn RegistryProvider>],
    image: &Image,
) -> Option<&'a Arc<dyn RegistryProvider>> {
    providers.iter().find(|p| p.match_image(image))
}

/// Normalize an image with the first matching provider, or mark it `unknown`.
pub fn normalize_with(providers: &[Arc<dyn RegistryProvider>], image: &Image) -> Image {
    match find_provider(providers, image) {
        Some(provider) => provider.normalize_image(image),
        None => {
            tracing::warn!(image = %image.name, registry = %image.registry.url, "No registry provider found");
            let mut unknown = image.clone();
            unknown.registry.name = UNKNOWN_REGISTRY.to_string();
            unknown
        }
    }
}

macro_rules! provider_component {
    ($provider:ty) => {
        #[async_trait::async_trait]
        impl shipwatch_core::component::Component for $provider {
            fn identity(&self) -> &shipwatch_core::component::ComponentIdentity {
                &self.base.identity
            }
        }
    };
}
pub(crate) use provider_component;
