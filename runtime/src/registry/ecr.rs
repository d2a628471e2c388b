//! Amazon ECR.
//!
//! Private registries (`<account>.dkr.ecr.<region>.amazonaws.com`) authenticate
//! with the Basic credentials returned by a SigV4-signed
//! `GetAuthorizationToken` call. The public gallery (`public.ecr.aws`) hands
//! out anonymous bearer tokens.

use async_trait::async_trait;
use serde::Deserialize;
use shipwatch_core::component::{ConfigSchema, FieldSpec, RawConfig};
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::{AuthScheme, Image};

use super::sigv4::{self, AwsCredentials};
use super::{check_status, registry_host, ProviderBase, RegistryProvider};
use crate::http::RequestOptions;

const PUBLIC_HOST: &str = "public.ecr.aws";
const PUBLIC_TOKEN_URL: &str = "https://public.ecr.aws/token/";
const GET_AUTHORIZATION_TOKEN: &str = "AmazonEC2ContainerRegistry_V20150921.GetAuthorizationToken";
const CREDENTIAL_FIELDS: [&str; 3] = ["accesskeyid", "secretaccesskey", "region"];

pub struct Ecr {
    base: ProviderBase,
}

super::provider_component!(Ecr);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationResponse {
    #[serde(default)]
    authorization_data: Vec<AuthorizationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationData {
    authorization_token: String,
}

impl Ecr {
    pub fn new(base: ProviderBase) -> Self {
        Self { base }
    }

    /// Credentials are all-or-nothing: once any is given, `accesskeyid`,
    /// `secretaccesskey` and `region` are required in that order.
    pub fn schema(raw: &RawConfig) -> ConfigSchema {
        let private = raw
            .keys()
            .any(|key| CREDENTIAL_FIELDS.contains(&key.to_lowercase().as_str()));
        let field = |name: &'static str| {
            let spec = FieldSpec::string(name);
            if private {
                spec.required()
            } else {
                spec
            }
        };
        ConfigSchema::new()
            .field(field("accesskeyid").secret())
            .field(field("secretaccesskey").secret())
            .field(field("region"))
    }

    fn credentials(&self) -> Option<AwsCredentials<'_>> {
        Some(AwsCredentials {
            access_key_id: self.base.setting("accesskeyid")?,
            secret_access_key: self.base.setting("secretaccesskey")?,
            region: self.base.setting("region")?,
            service: "ecr",
        })
    }

    /// `<account>.dkr.ecr.<region>.amazonaws.com`
    fn is_private_host(host: &str) -> bool {
        host.strip_suffix(".amazonaws.com")
            .and_then(|rest| rest.split_once(".dkr.ecr."))
            .is_some_and(|(account, region)| !account.is_empty() && !region.is_empty())
    }

    fn is_public(image: &Image) -> bool {
        registry_host(&image.registry.url) == PUBLIC_HOST
    }

    /// Basic credentials (`base64(AWS:<password>)`) for a private registry.
    async fn authorization_token(&self, credentials: &AwsCredentials<'_>) -> Result<String> {
        let url = format!("https://api.ecr.{}.amazonaws.com/", credentials.region);
        let mut options = RequestOptions::post_json(url.as_str(), &serde_json::json!({}))?
            .header("content-type", "application/x-amz-json-1.1")
            .header("x-amz-target", GET_AUTHORIZATION_TOKEN)
            .with_timeout(self.base.auth_timeout);
        sigv4::sign(&mut options, credentials, chrono::Utc::now())?;

        let response = tokio::time::timeout(self.base.auth_timeout, self.base.http.request(options))
            .await
            .map_err(|_| WatchError::Timeout(format!("authentication against {}", url)))??;
        let response = check_status(response, &self.base.registry_name(), &url)?;
        let body: AuthorizationResponse = response.json()?;
        body.authorization_data
            .into_iter()
            .next()
            .map(|data| data.authorization_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| WatchError::Authentication {
                registry: self.base.registry_name(),
                message: "GetAuthorizationToken returned no authorization data".to_string(),
            })
    }
}

#[async_trait]
impl RegistryProvider for Ecr {
    fn base(&self) -> &ProviderBase {
        &self.base
    }

    fn match_image(&self, image: &Image) -> bool {
        let host = registry_host(&image.registry.url);
        if host == PUBLIC_HOST {
            return true;
        }
        self.credentials().is_some() && Self::is_private_host(&host)
    }

    fn normalize_image(&self, image: &Image) -> Image {
        self.base
            .normalize_to(image, &registry_host(&image.registry.url))
    }

    async fn authenticate(&self, image: &Image, mut options: RequestOptions) -> Result<RequestOptions> {
        if Self::is_public(image) {
            let token = self.base.fetch_token(RequestOptions::get(PUBLIC_TOKEN_URL)).await?;
            options.bearer_auth(&token);
            return Ok(options);
        }
        let credentials = self.credentials().ok_or_else(|| WatchError::Authentication {
            registry: self.base.registry_name(),
            message: "no AWS credentials configured".to_string(),
        })?;
        let token = self.authorization_token(&credentials).await?;
        options.basic_auth_encoded(&token);
        Ok(options)
    }

    fn auth_scheme(&self) -> Option<AuthScheme> {
        if self.credentials().is_some() {
            Some(AuthScheme::Basic)
        } else {
            Some(AuthScheme::Bearer)
        }
    }
}
