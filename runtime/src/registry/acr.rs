//! Azure Container Registry (`*.azurecr.io`), service principal Basic auth.

use async_trait::async_trait;
use shipwatch_core::component::{ConfigSchema, FieldSpec};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::{registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

pub struct Acr {
    base: ProviderBase,
}

super::provider_component!(Acr);

impl Acr {
    pub fn new(base: ProviderBase) -> Self {
        Self { base }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("clientid").required())
            .field(FieldSpec::string("clientsecret").required().secret())
    }

    fn client_id(&self) -> &str {
        self.base.setting("clientid").unwrap_or_default()
    }

    fn client_secret(&self) -> &str {
        self.base.setting("clientsecret").unwrap_or_default()
    }
}

#[async_trait]
impl RegistryProvider for Acr {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        registry_host(&image.registry.url).ends_with(".azurecr.io")
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base
            .normalize_to(image, &registry_host(&image.registry.url))
    }

    async fn authenticate(&self, _image: &Image, mut options: RequestOptions) -> Result<RequestOptions> {
        options.basic_auth(self.client_id(), self.client_secret());
        Ok(options)
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        Some(AuthScheme::Basic)
    }

    fn auth_pull(&self) -> Option<PullCredentials> {
        Some(PullCredentials {
            username: self.client_id().to_string(),
            password: self.client_secret().to_string(),
        })
    }
}
