//! Gitea (and Forgejo) package registry.
//!
//! `url` may omit the scheme, `https` is assumed. Gitea answers `/v2/` with a
//! Bearer challenge whose realm trades Basic credentials for a pull token.

use async_trait::async_trait;
use shipwatch_core::component::{ConfigSchema, FieldSpec};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::challenge::{BasicCredentials, ChallengeAuth};
use super::{registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

pub struct Gitea {
    base: ProviderBase,
    auth: ChallengeAuth,
}

super::provider_component!(Gitea);

impl Gitea {
    pub fn new(base: ProviderBase) -> Self {
        Self {
            base,
            auth: ChallengeAuth::new(),
        }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("url").required())
            .field(FieldSpec::string("login"))
            .field(FieldSpec::string("password").secret())
            .field(FieldSpec::string("auth").secret())
            .together(&["login", "password"])
    }

    /// Configured URL with a scheme and without a trailing slash.
    fn base_url(&self) -> String {
        let url = self.base.setting("url").unwrap_or_default().trim();
        let url = if url.to_ascii_lowercase().starts_with("http") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        url.trim_end_matches('/').to_string()
    }

    fn api_root(&self) -> String {
        let url = self.base_url();
        let scheme = if url.starts_with("http://") { "http" } else { "https" };
        format!("{}://{}/v2", scheme, registry_host(&url))
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
}

#[async_trait]
impl RegistryProvider for Gitea {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        let host = registry_host(&self.base_url());
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

#[cfg(test)]
mod tests {
    use crate::http::{HttpResponse, Method, RequestOptions};
    use crate::registry::test_util::*;
    use crate::registry::{schema, RegistryProvider};
    use serde_json::json;
    use shipwatch_core::model::AuthScheme;

    const CHALLENGE: &str =
        r#"Bearer realm="https://git.example.org/v2/token",service="container_registry",scope="*""#;

    #[test]
    fn test_url_without_scheme() {
        let (gitea, _) = provider("gitea", "home", json!({"url": "git.example.org/"}));
        let img = image("git.example.org", "team/app");
        assert_normalize_laws(gitea.as_ref(), &img);
        let normalized = gitea.normalize_image(&img);
        assert_eq!(normalized.registry.url, "https://git.example.org/v2");
        assert_eq!(normalized.registry.name, "gitea.home");
        assert!(!gitea.match_image(&image("ghcr.io", "team/app")));
    }

    #[test]
    fn test_plain_http_url() {
        let (gitea, _) = provider("gitea", "lab", json!({"url": "http://10.0.0.9:3000"}));
        let normalized = gitea.normalize_image(&image("10.0.0.9:3000", "team/app"));
        assert_eq!(normalized.registry.url, "http://10.0.0.9:3000/v2");
    }

    #[tokio::test]
    async fn test_token_from_challenge() {
        let (gitea, stub) = provider(
            "gitea",
            "home",
            json!({"url": "https://git.example.org", "login": "me", "password": "pw"}),
        );
        stub.on(
            Method::Get,
            "https://git.example.org/v2/",
            HttpResponse::new(401, "").with_header("www-authenticate", CHALLENGE),
        );
        stub.on_prefix(
            Method::Get,
            "https://git.example.org/v2/token?",
            HttpResponse::new(200, r#"{"token": "gitea-token"}"#),
        );

        let options = gitea
            .authenticate(
                &image("git.example.org", "team/app"),
                RequestOptions::get("https://git.example.org/v2/team/app/tags/list"),
            )
            .await
            .unwrap();
        assert_eq!(options.authorization(), Some("Bearer gitea-token"));
        assert_eq!(gitea.auth_scheme(), Some(AuthScheme::Bearer));
        assert_eq!(gitea.auth_pull().unwrap().username, "me");
    }

    #[test]
    fn test_password_is_masked() {
        let (gitea, _) = provider(
            "gitea",
            "home",
            json!({"url": "git.example.org", "login": "me", "password": "verysecret"}),
        );
        let masked = gitea.mask_configuration();
        assert_eq!(masked["login"], "me");
        assert_ne!(masked["password"], "verysecret");
    }

    #[test]
    fn test_url_required() {
        let raw = raw(json!({"login": "me", "password": "pw"}));
        let err = schema("gitea", &raw).unwrap().validate(&raw).unwrap_err();
        assert_eq!(err.to_string(), "field url is required");
    }
}
