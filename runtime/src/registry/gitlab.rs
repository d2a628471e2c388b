//! GitLab container registry, gitlab.com or self-hosted.

use async_trait::async_trait;
use shipwatch_core::component::{ConfigSchema, FieldSpec, FieldType};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::{pull_scope, registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

const DEFAULT_URL: &str = "https://registry.gitlab.com";
const DEFAULT_AUTH_URL: &str = "https://gitlab.com";

pub struct Gitlab {
    base: ProviderBase,
}

super::provider_component!(Gitlab);

impl Gitlab {
    pub fn new(base: ProviderBase) -> Self {
        Self { base }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::new("url", FieldType::Url).default_value(DEFAULT_URL))
            .field(FieldSpec::new("authurl", FieldType::Url).default_value(DEFAULT_AUTH_URL))
            .field(FieldSpec::string("token").required().secret())
    }

    fn host(&self) -> String {
        registry_host(self.base.setting("url").unwrap_or(DEFAULT_URL))
    }

    fn token(&self) -> &str {
        self.base.setting("token").unwrap_or_default()
    }
}

#[async_trait]
impl RegistryProvider for Gitlab {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        registry_host(&image.registry.url) == self.host()
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base.normalize_to(image, &self.host())
    }

    /// JWT from `<authurl>/jwt/auth`, authenticated with the personal access token.
    async fn authenticate(&self, image: &Image, mut options: RequestOptions) -> Result<RequestOptions> {
        let auth_url = self
            .base
            .setting("authurl")
            .unwrap_or(DEFAULT_AUTH_URL)
            .trim_end_matches('/');
        let mut token_request = RequestOptions::get(format!(
            "{}/jwt/auth?service=container_registry&scope={}",
            auth_url,
            pull_scope(image)
        ));
        token_request.basic_auth("", self.token());
        let token = self.base.fetch_token(token_request).await?;
        options.bearer_auth(&token);
        Ok(options)
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        Some(AuthScheme::Bearer)
    }

    fn auth_pull(&self) -> Option<PullCredentials> {
        Some(PullCredentials {
            username: String::new(),
            password: self.token().to_string(),
        })
    }
}
