//! Generic v2 registry at a configured URL.
//!
//! Credentials go out as Basic auth, or are exchanged for a bearer token when
//! the registry answers with a `WWW-Authenticate: Bearer` challenge.

use async_trait::async_trait;
use shipwatch_core::component::{ConfigSchema, FieldSpec, FieldType};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::challenge::{BasicCredentials, ChallengeAuth};
use super::{registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

pub struct Custom {
    base: ProviderBase,
    auth: ChallengeAuth,
}

super::provider_component!(Custom);

impl Custom {
    pub fn new(base: ProviderBase) -> Self {
        Self {
            base,
            auth: ChallengeAuth::new(),
        }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::new("url", FieldType::Url).required())
            .field(FieldSpec::string("login"))
            .field(FieldSpec::string("password").secret())
            .field(FieldSpec::string("auth").secret())
            .together(&["login", "password"])
    }

    fn url(&self) -> &str {
        self.base.setting("url").unwrap_or_default()
    }

    fn login(&self) -> Option<(&str, &str)> {
        Some((self.base.setting("login")?, self.base.setting("password")?))
    }

    fn credentials(&self) -> Option<BasicCredentials> {
        match self.login() {
            Some((login, password)) => Some(BasicCredentials::Pair {
                login: login.to_string(),
                password: password.to_string(),
            }),
            None => self
                .base
                .setting("auth")
                .map(|auth| BasicCredentials::Encoded(auth.to_string())),
        }
    }

    fn api_root(&self) -> String {
        let scheme = if self.url().starts_with("http://") { "http" } else { "https" };
        format!("{}://{}/v2", scheme, registry_host(self.url()))
    }
}

#[async_trait]
impl RegistryProvider for Custom {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        let host = registry_host(self.url());
        !host.is_empty() && registry_host(&image.registry.url) == host
    }

    fn normalize_image(&self, image: &Image) -> Image {
        let mut normalized = image.clone();
        normalized.registry.url = self.api_root();
        normalized.registry.name = self.base.registry_name();
        normalized
    }

    async fn authenticate(&self, image: &Image, options: RequestOptions) -> Result<RequestOptions> {
        let credentials = self.credentials();
        self.auth
            .authenticate(&self.base, &self.api_root(), image, credentials.as_ref(), options)
            .await
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        if self.auth.uses_bearer() {
            Some(AuthScheme::Bearer)
        } else if self.credentials().is_some() {
            Some(AuthScheme::Basic)
        } else {
            None
        }
    }

    fn auth_pull(&self) -> Option<PullCredentials> {
        self.login().map(|(login, password)| PullCredentials {
            username: login.to_string(),
            password: password.to_string(),
        })
    }
}
