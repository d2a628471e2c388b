//! Token auth discovered from a registry's `WWW-Authenticate` challenge.
//!
//! Self-hosted and proxy registries (Gitea, Harbor, lscr.io, ...) answer an
//! unauthenticated `GET /v2/` with `401` and
//! `WWW-Authenticate: Bearer realm="...",service="..."`. The realm hands out
//! pull tokens, with Basic credentials when the provider has some. Registries
//! that send no Bearer challenge get the Basic credentials directly.

use parking_lot::Mutex;
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::Image;
use url::Url;

use super::{pull_scope, ProviderBase};
use crate::http::RequestOptions;

/// Parsed `Bearer` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parse a `WWW-Authenticate` value. Anything but a `Bearer` challenge
    /// with a realm is `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in auth_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }
        Some(Self {
            realm: realm.filter(|r| !r.is_empty())?,
            service,
            scope,
        })
    }

    /// Token endpoint asking for `scope`, falling back to the challenge's own
    /// scope when `scope` is empty.
    pub fn token_url(&self, scope: &str) -> Result<String> {
        let mut url = Url::parse(&self.realm)
            .map_err(|e| WatchError::Parse(format!("invalid token realm {}: {}", self.realm, e)))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &self.service {
                query.append_pair("service", service);
            }
            let scope = Some(scope)
                .filter(|s| !s.is_empty())
                .or(self.scope.as_deref());
            if let Some(scope) = scope {
                query.append_pair("scope", scope);
            }
        }
        Ok(url.into())
    }
}

/// `key=value` and `key="quoted, value"` pairs of a challenge.
fn auth_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().to_string();
        let after = after.trim_start();
        let (value, remaining) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => match after.find(',') {
                Some(end) => (after[..end].trim_end(), &after[end..]),
                None => (after.trim_end(), ""),
            },
        };
        params.push((key, value.to_string()));
        rest = remaining;
    }
    params
}

/// Basic credentials a provider may present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasicCredentials {
    Pair { login: String, password: String },
    /// Already base64-encoded `login:password`.
    Encoded(String),
}

impl BasicCredentials {
    pub fn apply(&self, options: &mut RequestOptions) {
        match self {
            BasicCredentials::Pair { login, password } => options.basic_auth(login, password),
            BasicCredentials::Encoded(auth) => options.basic_auth_encoded(auth),
        }
    }
}

/// Discovers once whether a registry wants bearer tokens, then authenticates
/// every request accordingly.
#[derive(Default)]
pub struct ChallengeAuth {
    /// `None` until a discovery request got an answer.
    discovered: Mutex<Option<Option<BearerChallenge>>>,
}

impl ChallengeAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Challenge of the registry at `api_root` (`https://host/v2`).
    ///
    /// Only an answered request is remembered; after a network error the
    /// next call asks again.
    pub async fn challenge(&self, base: &ProviderBase, api_root: &str) -> Option<BearerChallenge> {
        let known = self.discovered.lock().clone();
        if let Some(known) = known {
            return known;
        }

        let url = format!("{}/", api_root.trim_end_matches('/'));
        let request = base
            .http
            .request(RequestOptions::get(&url).with_timeout(base.auth_timeout));
        let answer = match tokio::time::timeout(base.auth_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!(registry = %base.registry_name(), error = %e, "Auth discovery failed");
                return None;
            }
            Err(_) => {
                tracing::debug!(registry = %base.registry_name(), "Auth discovery timed out");
                return None;
            }
        };

        let challenge = (answer.status == 401)
            .then(|| answer.header("www-authenticate").and_then(BearerChallenge::parse))
            .flatten();
        tracing::debug!(
            registry = %base.registry_name(),
            bearer = challenge.is_some(),
            "Registry auth discovered"
        );
        *self.discovered.lock() = Some(challenge.clone());
        challenge
    }

    /// Bearer token from the challenge realm when the registry sends one,
    /// otherwise the Basic credentials as they are.
    pub async fn authenticate(
        &self,
        base: &ProviderBase,
        api_root: &str,
        image: &Image,
        credentials: Option<&BasicCredentials>,
        mut options: RequestOptions,
    ) -> Result<RequestOptions> {
        match self.challenge(base, api_root).await {
            Some(challenge) => {
                let scope = if image.name.is_empty() {
                    String::new()
                } else {
                    pull_scope(image)
                };
                let mut token_request = RequestOptions::get(challenge.token_url(&scope)?);
                if let Some(credentials) = credentials {
                    credentials.apply(&mut token_request);
                }
                let token = base.fetch_token(token_request).await?;
                options.bearer_auth(&token);
            }
            None => {
                if let Some(credentials) = credentials {
                    credentials.apply(&mut options);
                }
            }
        }
        Ok(options)
    }

    /// Whether discovery found a Bearer challenge.
    pub fn uses_bearer(&self) -> bool {
        matches!(self.discovered.lock().as_ref(), Some(Some(_)))
    }
}
