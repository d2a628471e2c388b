//! Quay (`quay.io`), optionally with robot account credentials.

use async_trait::async_trait;
use shipwatch_core::component::{ConfigSchema, FieldSpec};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::{pull_scope, registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

const QUAY_HOST: &str = "quay.io";
const TOKEN_URL: &str = "https://quay.io/v2/auth";

pub struct Quay {
    base: ProviderBase,
}

super::provider_component!(Quay);

impl Quay {
    pub fn new(base: ProviderBase) -> Self {
        Self { base }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("namespace"))
            .field(FieldSpec::string("account"))
            .field(FieldSpec::string("token").secret())
            .together(&["namespace", "account", "token"])
    }

    /// Robot account `namespace+account` and its token.
    fn credentials(&self) -> Option<(String, &str)> {
        let namespace = self.base.setting("namespace")?;
        let account = self.base.setting("account")?;
        let token = self.base.setting("token")?;
        Some((format!("{}+{}", namespace, account), token))
    }
}

#[async_trait]
impl RegistryProvider for Quay {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        registry_host(&image.registry.url) == QUAY_HOST
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base.normalize_to(image, QUAY_HOST)
    }

    async fn authenticate(&self, image: &Image, mut options: RequestOptions) -> Result<RequestOptions> {
        let Some((robot, token)) = self.credentials() else {
            return Ok(options);
        };
        let mut token_request = RequestOptions::get(format!(
            "{}?service=quay.io&scope={}",
            TOKEN_URL,
            pull_scope(image)
        ));
        token_request.basic_auth(&robot, token);
        let bearer = self.base.fetch_token(token_request).await?;
        options.bearer_auth(&bearer);
        Ok(options)
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        self.credentials().map(|_| AuthScheme::Bearer)
    }

    fn auth_pull(&self) -> Option<PullCredentials> {
        self.credentials().map(|(robot, token)| PullCredentials {
            username: robot,
            password: token.to_string(),
        })
    }
}
