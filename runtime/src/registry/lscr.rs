//! LinuxServer.io registry (`lscr.io`).
//!
//! lscr.io fronts GitHub packages and issues pull tokens through a Bearer
//! challenge. A GitHub `username` and `token` go to the token realm as
//! Basic credentials.

use async_trait::async_trait;
use shipwatch_core::component::{ConfigSchema, FieldSpec};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::challenge::{BasicCredentials, ChallengeAuth};
use super::{registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

const LSCR_HOST: &str = "lscr.io";
const API_ROOT: &str = "https://lscr.io/v2";

pub struct Lscr {
    base: ProviderBase,
    auth: ChallengeAuth,
}

super::provider_component!(Lscr);

impl Lscr {
    pub fn new(base: ProviderBase) -> Self {
        Self {
            base,
            auth: ChallengeAuth::new(),
        }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("username"))
            .field(FieldSpec::string("token").secret())
            .together(&["username", "token"])
    }

    fn credentials(&self) -> Option<BasicCredentials> {
        Some(BasicCredentials::Pair {
            login: self.base.setting("username")?.to_string(),
            password: self.base.setting("token")?.to_string(),
        })
    }
}

#[async_trait]
impl RegistryProvider for Lscr {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        registry_host(&image.registry.url) == LSCR_HOST
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base.normalize_to(image, LSCR_HOST)
    }

    async fn authenticate(&self, image: &Image, options: RequestOptions) -> Result<RequestOptions> {
        let credentials = self.credentials();
        self.auth
            .authenticate(&self.base, API_ROOT, image, credentials.as_ref(), options)
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
        Some(PullCredentials {
            username: self.base.setting("username")?.to_string(),
            password: self.base.setting("token")?.to_string(),
        })
    }
}
