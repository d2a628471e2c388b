//! Docker Hub.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use shipwatch_core::component::{ConfigSchema, FieldSpec};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::{pull_scope, registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

/// Host serving the v2 API for every Hub alias.
const API_HOST: &str = "registry-1.docker.io";
const TOKEN_URL: &str = "https://auth.docker.io/token";

pub struct Hub {
    base: ProviderBase,
}

super::provider_component!(Hub);

impl Hub {
    pub fn new(base: ProviderBase) -> Self {
        Self { base }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("login"))
            .field(FieldSpec::string("password").secret())
            .field(FieldSpec::string("token").secret())
            .field(FieldSpec::string("auth").secret())
    }

    /// `login` with `password` or `token`, else the decoded `auth` pair.
    fn credentials(&self) -> Option<(String, String)> {
        if let Some(login) = self.base.setting("login") {
            let secret = self
                .base
                .setting("password")
                .or_else(|| self.base.setting("token"))?;
            return Some((login.to_string(), secret.to_string()));
        }
        let decoded = STANDARD.decode(self.base.setting("auth")?).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (login, password) = decoded.split_once(':')?;
        Some((login.to_string(), password.to_string()))
    }
}

#[async_trait]
impl RegistryProvider for Hub {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        let host = registry_host(&image.registry.url);
        host.is_empty()
            || host == "docker.io"
            || host.ends_with(".docker.io")
            || host == "registry.hub.docker.com"
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base.normalize_to(image, API_HOST)
    }

    async fn authenticate(&self, image: &Image, mut options: RequestOptions) -> Result<RequestOptions> {
        let mut token_request = RequestOptions::get(format!(
            "{}?service=registry.docker.io&scope={}&grant_type=password",
            TOKEN_URL,
            pull_scope(image)
        ));
        if let Some((login, password)) = self.credentials() {
            token_request.basic_auth(&login, &password);
        }
        let token = self.base.fetch_token(token_request).await?;
        options.bearer_auth(&token);
        Ok(options)
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        Some(AuthScheme::Bearer)
    }

    fn auth_pull(&self) -> Option<PullCredentials> {
        self.credentials()
            .map(|(username, password)| PullCredentials { username, password })
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{basic_credentials, HttpResponse, Method, RequestOptions};
    use crate::registry::test_util::*;
    use crate::registry::RegistryProvider;
    use serde_json::json;

    const TOKEN: &str = "https://auth.docker.io/token?service=registry.docker.io&scope=repository:library/nginx:pull&grant_type=password";

    #[test]
    fn test_match_aliases() {
        let (hub, _) = provider("hub", "public", json!({}));
        for host in ["", "docker.io", "index.docker.io", "registry.hub.docker.com", "https://registry-1.docker.io/v2"] {
            assert!(hub.match_image(&image(host, "library/nginx")), "{}", host);
        }
        assert!(!hub.match_image(&image("ghcr.io", "library/nginx")));
    }

    #[test]
    fn test_normalize() {
        let (hub, _) = provider("hub", "public", json!({}));
        let img = image("docker.io", "library/nginx");
        assert_normalize_laws(hub.as_ref(), &img);
        let normalized = hub.normalize_image(&img);
        assert_eq!(normalized.registry.url, "https://registry-1.docker.io/v2");
        assert_eq!(normalized.registry.name, "hub.public");
        assert_eq!(normalized.name, "library/nginx");
    }

    #[tokio::test]
    async fn test_anonymous_token() {
        let (hub, stub) = provider("hub", "public", json!({}));
        stub.on(Method::Get, TOKEN, HttpResponse::new(200, r#"{"token":"anon"}"#));
        let options = hub
            .authenticate(&image("docker.io", "library/nginx"), RequestOptions::get("https://x/v2/"))
            .await
            .unwrap();
        assert_eq!(options.authorization(), Some("Bearer anon"));
        assert_eq!(stub.requests()[0].authorization(), None);
        assert!(hub.auth_pull().is_none());
    }

    #[tokio::test]
    async fn test_token_with_login() {
        let (hub, stub) = provider("hub", "private", json!({"login": "me", "token": "dckr_pat"}));
        stub.on(Method::Get, TOKEN, HttpResponse::new(200, r#"{"access_token":"auth"}"#));
        let options = hub
            .authenticate(&image("docker.io", "library/nginx"), RequestOptions::get("https://x/v2/"))
            .await
            .unwrap();
        assert_eq!(options.authorization(), Some("Bearer auth"));
        let expected = format!("Basic {}", basic_credentials("me", "dckr_pat"));
        assert_eq!(stub.requests()[0].authorization(), Some(expected.as_str()));
    }

    #[test]
    fn test_auth_field_decoded() {
        let (hub, _) = provider("hub", "private", json!({"auth": basic_credentials("me", "pw")}));
        let creds = hub.auth_pull().unwrap();
        assert_eq!(creds.username, "me");
        assert_eq!(creds.password, "pw");
    }
}
