//! GitHub Container Registry (`ghcr.io`).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use shipwatch_core::component::{ConfigSchema, FieldSpec};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::{registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

const GHCR_HOST: &str = "ghcr.io";

pub struct Ghcr {
    base: ProviderBase,
}

super::provider_component!(Ghcr);

impl Ghcr {
    pub fn new(base: ProviderBase) -> Self {
        Self { base }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("username"))
            .field(FieldSpec::string("token").secret())
    }
}

#[async_trait]
impl RegistryProvider for Ghcr {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        registry_host(&image.registry.url) == GHCR_HOST
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base.normalize_to(image, GHCR_HOST)
    }

    /// ghcr.io accepts a base64 token (or `:` for public images) as bearer.
    async fn authenticate(&self, _image: &Image, mut options: RequestOptions) -> Result<RequestOptions> {
        let token = self.base.setting("token").unwrap_or(":");
        options.bearer_auth(&STANDARD.encode(token));
        Ok(options)
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        Some(AuthScheme::Bearer)
    }

    fn auth_pull(&self) -> Option<PullCredentials> {
        Some(PullCredentials {
            username: self.base.setting("username")?.to_string(),
            password: self.base.setting("token")?.to_string(),
        })
    }
}
