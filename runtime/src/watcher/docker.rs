//! Docker Engine API source over a Unix socket or TCP.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shipwatch_core::error::{Result, WatchError};

use super::source::{ContainerSource, ContainerSummary, ImageDetails};
use crate::http::{HttpClient, HttpResponse, RequestOptions};

/// Docker Engine reached at `<protocol>://<host>:<port>` or through a socket.
pub struct DockerSource {
    host: String,
    base_url: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
    credentials: Option<(String, String)>,
}

impl DockerSource {
    /// Engine listening on TCP.
    pub fn new(
        protocol: &str,
        host: &str,
        port: u64,
        http: Arc<dyn HttpClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            host: host.to_string(),
            base_url: format!("{}://{}:{}", protocol, host, port),
            http,
            timeout,
            credentials: None,
        }
    }

    /// Engine listening on a Unix socket. `http` must be bound to that socket,
    /// the URL host is only a placeholder.
    pub fn socket(path: &Path, http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            host: path.display().to_string(),
            base_url: "http://localhost".to_string(),
            http,
            timeout,
            credentials: None,
        }
    }

    /// Send `Authorization: Basic` with every request, for daemons behind
    /// an authenticating proxy.
    pub fn with_basic_auth(mut self, login: &str, password: &str) -> Self {
        self.credentials = Some((login.to_string(), password.to_string()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut options = RequestOptions::get(&url).with_timeout(self.timeout);
        if let Some((login, password)) = &self.credentials {
            options.basic_auth(login, password);
        }
        let response = self.http.request(options).await?;
        if !response.is_success() {
            return Err(WatchError::network(
                &url,
                format!("Docker API returned HTTP {}", response.status),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ContainerSource for DockerSource {
    fn host(&self) -> &str {
        &self.host
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        tracing::debug!(host = %self.host, all, "Listing containers");
        self.get(&format!("/containers/json?all={}", all))
            .await?
            .json()
    }

    async fn get_container_image(&self, container: &ContainerSummary) -> Result<ImageDetails> {
        self.get(&format!("/images/{}/json", container.image))
            .await?
            .json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::testing::StubHttpClient;
    use serde_json::json;
    use shipwatch_core::error::ErrorKind;

    fn source() -> (DockerSource, StubHttpClient) {
        let stub = StubHttpClient::new();
        let source = DockerSource::new(
            "http",
            "10.0.0.5",
            2375,
            Arc::new(stub.clone()),
            Duration::from_secs(5),
        );
        (source, stub)
    }

    #[tokio::test]
    async fn test_list_containers() {
        let (source, stub) = source();
        stub.on(
            Method::Get,
            "http://10.0.0.5:2375/containers/json?all=false",
            HttpResponse::new(
                200,
                json!([{"Id": "a", "Names": ["/web"], "Image": "nginx:1.25.3", "State": "running", "Labels": {}}])
                    .to_string(),
            ),
        );
        let containers = source.list_containers(false).await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].display_name(), "web");
        assert_eq!(source.host(), "10.0.0.5");
    }

    #[tokio::test]
    async fn test_inspect_image() {
        let (source, stub) = source();
        stub.on(
            Method::Get,
            "http://10.0.0.5:2375/images/ghcr.io/org/app:1.0.0/json",
            HttpResponse::new(
                200,
                json!({
                    "Id": "sha256:img", "RepoTags": ["ghcr.io/org/app:1.0.0"],
                    "RepoDigests": ["ghcr.io/org/app@sha256:repo"],
                    "Os": "linux", "Architecture": "amd64", "Created": "2024-01-01T00:00:00Z"
                })
                .to_string(),
            ),
        );
        let summary = ContainerSummary {
            id: "a".to_string(),
            image: "ghcr.io/org/app:1.0.0".to_string(),
            ..Default::default()
        };
        let details = source.get_container_image(&summary).await.unwrap();
        assert_eq!(details.id, "sha256:img");
        assert_eq!(details.repo_digest().as_deref(), Some("sha256:repo"));
        assert_eq!(details.variant, None);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let (source, stub) = source();
        stub.unreachable_prefix(Method::Get, "http://10.0.0.5:2375/");
        let err = source.list_containers(true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_error_status() {
        let (source, stub) = source();
        stub.on(
            Method::Get,
            "http://10.0.0.5:2375/containers/json?all=true",
            HttpResponse::new(500, "boom"),
        );
        assert!(source.list_containers(true).await.is_err());
    }

    #[tokio::test]
    async fn test_socket_source_uses_placeholder_host() {
        let stub = StubHttpClient::new();
        let source = DockerSource::socket(
            Path::new("/var/run/docker.sock"),
            Arc::new(stub.clone()),
            Duration::from_secs(5),
        );
        stub.on(
            Method::Get,
            "http://localhost/containers/json?all=true",
            HttpResponse::new(200, "[]"),
        );
        assert!(source.list_containers(true).await.unwrap().is_empty());
        assert_eq!(source.host(), "/var/run/docker.sock");
    }

    #[tokio::test]
    async fn test_basic_auth_sent() {
        let (source, stub) = source();
        let source = source.with_basic_auth("admin", "pw");
        stub.on(
            Method::Get,
            "http://10.0.0.5:2375/containers/json?all=true",
            HttpResponse::new(200, "[]"),
        );
        source.list_containers(true).await.unwrap();
        let sent = &stub.requests_to("http://10.0.0.5:2375/")[0];
        assert_eq!(sent.authorization(), Some("Basic YWRtaW46cHc="));
    }
}
