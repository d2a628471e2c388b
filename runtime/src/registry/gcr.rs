//! Google Container Registry (`gcr.io` and regional `*.gcr.io`).

use async_trait::async_trait;
use shipwatch_core::component::{ConfigSchema, FieldSpec};
use shipwatch_core::error::Result;
use shipwatch_core::model::{AuthScheme, Image};

use super::{pull_scope, registry_host, ProviderBase, PullCredentials, RegistryProvider};
use crate::http::RequestOptions;

const TOKEN_URL: &str = "https://gcr.io/v2/token";
const JSON_KEY_USER: &str = "_json_key";

pub struct Gcr {
    base: ProviderBase,
}

super::provider_component!(Gcr);

impl Gcr {
    pub fn new(base: ProviderBase) -> Self {
        Self { base }
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("clientemail"))
            .field(FieldSpec::string("privatekey").secret())
            .together(&["clientemail", "privatekey"])
    }

    /// Service account key in the JSON form the token endpoint accepts as password.
    fn json_key(&self) -> Option<String> {
        let email = self.base.setting("clientemail")?;
        let key = self.base.setting("privatekey")?;
        Some(
            serde_json::json!({
                "private_key": key,
                "client_email": email,
            })
            .to_string(),
        )
    }
}

#[async_trait]
impl RegistryProvider for Gcr {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        let host = registry_host(&image.registry.url);
        host == "gcr.io" || host.ends_with(".gcr.io")
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base
            .normalize_to(image, &registry_host(&image.registry.url))
    }

    async fn authenticate(&self, image: &Image, mut options: RequestOptions) -> Result<RequestOptions> {
        let Some(json_key) = self.json_key() else {
            return Ok(options);
        };
        let mut token_request = RequestOptions::get(format!("{}?scope={}", TOKEN_URL, pull_scope(image)));
        token_request.basic_auth(JSON_KEY_USER, &json_key);
        let token = self.base.fetch_token(token_request).await?;
        options.bearer_auth(&token);
        Ok(options)
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        self.json_key().map(|_| AuthScheme::Bearer)
    }

    fn auth_pull(&self) -> Option<PullCredentials> {
        Some(PullCredentials {
            username: JSON_KEY_USER.to_string(),
            password: self.json_key()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::http::{basic_credentials, HttpResponse, Method, RequestOptions};
    use crate::registry::test_util::*;
    use crate::registry::{schema, RegistryProvider};
    use serde_json::json;

    fn gcr() -> (std::sync::Arc<dyn RegistryProvider>, crate::testing::StubHttpClient) {
        provider(
            "gcr",
            "private",
            json!({"clientemail": "bot@project.iam.gserviceaccount.com", "privatekey": "-----BEGIN KEY-----"}),
        )
    }

    #[test]
    fn test_match() {
        let (gcr, _) = gcr();
        assert!(gcr.match_image(&image("gcr.io", "project/app")));
        assert!(gcr.match_image(&image("eu.gcr.io", "project/app")));
        assert!(gcr.match_image(&image("https://us.gcr.io/v2", "project/app")));
        assert!(!gcr.match_image(&image("notgcr.io", "project/app")));
        assert_normalize_laws(gcr.as_ref(), &image("eu.gcr.io", "project/app"));
    }

    #[tokio::test]
    async fn test_token_exchange() {
        let (gcr, stub) = gcr();
        stub.on(
            Method::Get,
            "https://gcr.io/v2/token?scope=repository:project/app:pull",
            HttpResponse::new(200, r#"{"token":"gcr-token"}"#),
        );
        let options = gcr
            .authenticate(&image("gcr.io", "project/app"), RequestOptions::get("https://gcr.io/v2/"))
            .await
            .unwrap();
        assert_eq!(options.authorization(), Some("Bearer gcr-token"));

        let sent = &stub.requests_to("https://gcr.io/v2/token")[0];
        let expected_key = json!({
            "private_key": "-----BEGIN KEY-----",
            "client_email": "bot@project.iam.gserviceaccount.com",
        })
        .to_string();
        let expected = format!("Basic {}", basic_credentials("_json_key", &expected_key));
        assert_eq!(sent.authorization(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_anonymous_passthrough() {
        let (gcr, stub) = provider("gcr", "public", json!({}));
        let options = gcr
            .authenticate(&image("gcr.io", "project/app"), RequestOptions::get("https://gcr.io/v2/"))
            .await
            .unwrap();
        assert_eq!(options.authorization(), None);
        assert!(stub.requests().is_empty());
        assert!(gcr.auth_pull().is_none());
    }

    #[test]
    fn test_email_requires_key() {
        let config = raw(json!({"clientemail": "bot@project.iam.gserviceaccount.com"}));
        let err = schema("gcr", &config).unwrap().validate(&config).unwrap_err();
        assert_eq!(err.to_string(), "field privatekey is required");
    }
}
