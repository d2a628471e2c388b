//! Outbound HTTP seam used by registry providers, watchers and triggers.
//!
//! Everything that talks to the network goes through [`HttpClient`], so tests
//! swap in a canned-response stub instead of a live server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use shipwatch_core::error::{Result, WatchError};

/// Default timeout for requests that do not set one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

/// A request description that authentication steps can decorate.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub url: String,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::Head, url)
    }

    /// POST with a JSON body.
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Result<Self> {
        let mut options = Self::new(Method::Post, url);
        options.body = Some(serde_json::to_string(body)?);
        options.set_header("content-type", "application/json");
        Ok(options)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `Authorization: Basic base64(login:password)`
    pub fn basic_auth(&mut self, login: &str, password: &str) {
        self.set_header(
            "authorization",
            format!("Basic {}", basic_credentials(login, password)),
        );
    }

    /// `Authorization: Basic <pre-encoded credentials>`
    pub fn basic_auth_encoded(&mut self, encoded: &str) {
        self.set_header("authorization", format!("Basic {}", encoded));
    }

    /// `Authorization: Bearer <token>`
    pub fn bearer_auth(&mut self, token: &str) {
        self.set_header("authorization", format!("Bearer {}", token));
    }

    pub fn authorization(&self) -> Option<&str> {
        self.get_header("authorization")
    }
}

/// Base64 of `login:password`.
pub fn basic_credentials(login: &str, password: &str) -> String {
    STANDARD.encode(format!("{}:{}", login, password))
}

/// A fully read response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| WatchError::Parse(format!("invalid JSON response: {}", e)))
    }
}

/// Generic request/response interface.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform one request. Non-2xx statuses are returned, not raised.
    async fn request(&self, options: RequestOptions) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by `reqwest`.
pub struct ReqwestClient {
    http: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("shipwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| WatchError::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Client that trusts `tls.ca` and presents `tls.cert`/`tls.key`.
    pub fn with_tls(tls: &TlsFiles) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("shipwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT);

        if let Some(ca) = &tls.ca {
            let pem = read_pem(ca)?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| tls_error(ca, e))?;
            builder = builder.add_root_certificate(certificate);
        }
        match (&tls.cert, &tls.key) {
            (Some(cert), Some(key)) => {
                let identity = reqwest::Identity::from_pkcs8_pem(&read_pem(cert)?, &read_pem(key)?)
                    .map_err(|e| tls_error(cert, e))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(WatchError::Other(
                    "TLS client certificate and key must be set together".to_string(),
                ))
            }
        }

        let http = builder
            .build()
            .map_err(|e| WatchError::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

/// PEM files for a TLS connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsFiles {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl TlsFiles {
    pub fn is_empty(&self) -> bool {
        self.ca.is_none() && self.cert.is_none() && self.key.is_none()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        WatchError::Other(format!("Failed to read {}: {}", path.display(), e))
    })
}

fn tls_error(path: &Path, e: impl std::fmt::Display) -> WatchError {
    WatchError::Other(format!("Invalid TLS material in {}: {}", path.display(), e))
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, options: RequestOptions) -> Result<HttpResponse> {
        let mut request = match options.method {
            Method::Get => self.http.get(&options.url),
            Method::Head => self.http.head(&options.url),
            Method::Post => self.http.post(&options.url),
        };
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = options.body {
            request = request.body(body);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        tracing::trace!(method = options.method.as_str(), url = %options.url, "HTTP request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                WatchError::Timeout(options.url.clone())
            } else {
                WatchError::network(&options.url, e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| WatchError::network(&options.url, e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// [`HttpClient`] speaking HTTP/1.1 over a Unix domain socket.
///
/// Only the path and query of each request URL are sent, so callers may use
/// any placeholder host (`http://docker/containers/json`).
#[cfg(unix)]
#[derive(Debug)]
pub struct UnixSocketClient {
    path: PathBuf,
}

#[cfg(unix)]
impl UnixSocketClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn send(&self, options: &RequestOptions) -> Result<HttpResponse> {
        let target = request_target(&options.url)?;
        let socket = self.path.display().to_string();

        let stream = tokio::net::UnixStream::connect(&self.path)
            .await
            .map_err(|e| WatchError::network(&socket, format!("cannot connect: {}", e)))?;
        let (mut sender, connection) = hyper::client::conn::handshake(stream)
            .await
            .map_err(|e| WatchError::network(&socket, e))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "Unix socket connection closed with error");
            }
        });

        let mut builder = hyper::Request::builder()
            .method(options.method.as_str())
            .uri(target)
            .header(hyper::header::HOST, "localhost");
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(hyper::Body::from(options.body.clone().unwrap_or_default()))
            .map_err(|e| WatchError::Other(format!("Invalid request for {}: {}", options.url, e)))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| WatchError::network(&socket, e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| WatchError::network(&socket, e))?;

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl HttpClient for UnixSocketClient {
    async fn request(&self, options: RequestOptions) -> Result<HttpResponse> {
        tracing::trace!(
            method = options.method.as_str(),
            socket = %self.path.display(),
            url = %options.url,
            "HTTP request over unix socket"
        );
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        tokio::time::timeout(timeout, self.send(&options))
            .await
            .map_err(|_| WatchError::Timeout(options.url.clone()))?
    }
}

/// Path and query of `url`, the origin-form request target.
fn request_target(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WatchError::Parse(format!("invalid URL {}: {}", url, e)))?;
    Ok(match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    })
}
