//! Container watchers.
//!
//! A watcher polls one container host on its own cron schedule. Each cycle
//! lists the host's containers, resolves every watched one against its
//! registry, diffs the outcome with the previous snapshot and publishes one
//! [`WatchEvent::ContainerReport`] per container followed by a
//! [`WatchEvent::CycleCompleted`].
//!
//! ```text
//! tick ─► list ─► inspect + resolve (bounded, per-container timeout) ─► diff ─► save ─► emit
//! ```
//!
//! Cycles of one watcher never overlap: a tick arriving while a cycle is
//! still running is skipped and counted.

pub mod diff;
pub mod docker;
pub mod labels;
pub mod schedule;
pub mod snapshot;
pub mod source;

pub use diff::{diff, CycleDiff};
pub use docker::DockerSource;
pub use labels::WatchLabels;
pub use schedule::CronSchedule;
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use source::{to_container, ContainerSource, ContainerSummary, ImageDetails};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use shipwatch_core::component::{
    Component, ComponentConfig, ComponentIdentity, ConfigSchema, FieldSpec, FieldType, RawConfig,
};
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::event::{EventEmitter, WatchEvent};
use shipwatch_core::model::{Container, ContainerError, Image, UpdateKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[cfg(unix)]
use crate::http::UnixSocketClient;
use crate::http::{HttpClient, ReqwestClient, TlsFiles};
use crate::metrics::EngineMetrics;
use crate::resolver::ImageResolver;

/// Watcher types known to the factory.
pub const WATCHER_TYPES: &[&str] = &["docker"];

/// Hourly, on the hour.
pub const DEFAULT_CRON: &str = "0 * * * *";

const DEFAULT_DOCKER_PORT: u64 = 2375;

/// Local Docker Engine socket, used unless `host` is set.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Shared collaborators handed to every watcher at construction.
#[derive(Clone)]
pub struct WatcherContext {
    pub resolver: ImageResolver,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub events: EventEmitter,
    pub metrics: EngineMetrics,
    pub http: Arc<dyn HttpClient>,
    /// Containers resolved in parallel when the watcher does not say otherwise.
    pub concurrency: usize,
    pub resolve_timeout: Duration,
}

/// A component that watches one container host.
#[async_trait]
pub trait Watcher: Component {
    /// Run one cycle now. `Ok(None)` when a cycle is already in progress.
    async fn watch(&self) -> Result<Option<CycleDiff>>;

    /// Configuration with every credential field masked.
    fn mask_configuration(&self) -> RawConfig;
}

/// Configuration schema for a watcher type.
pub fn schema(type_name: &str) -> Result<ConfigSchema> {
    match type_name {
        "docker" => Ok(DockerWatcher::schema()),
        other => Err(WatchError::config(
            format!("watcher.{}", other),
            format!("unknown watcher type '{}'", other),
        )),
    }
}

/// Construct a watcher from a validated configuration.
pub fn build(
    identity: ComponentIdentity,
    config: ComponentConfig,
    ctx: &WatcherContext,
) -> Result<Arc<dyn Watcher>> {
    match identity.type_name.as_str() {
        "docker" => Ok(Arc::new(DockerWatcher::new(identity, config, ctx.clone())?)),
        other => Err(WatchError::config(
            identity.id(),
            format!("unknown watcher type '{}'", other),
        )),
    }
}

/// Watcher for a Docker Engine reachable over its Unix socket or TCP.
pub struct DockerWatcher {
    identity: ComponentIdentity,
    config: ComponentConfig,
    schedule: CronSchedule,
    watch_at_start: bool,
    runner: Arc<CycleRunner>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DockerWatcher {
    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::string("socket").default_value(DEFAULT_DOCKER_SOCKET))
            .field(FieldSpec::string("host"))
            .field(FieldSpec::new("protocol", FieldType::Enum(&["http", "https"])).default_value("http"))
            .field(FieldSpec::integer("port").default_value(DEFAULT_DOCKER_PORT))
            .field(FieldSpec::string("username"))
            .field(FieldSpec::string("password").secret())
            .field(FieldSpec::string("cafile").secret())
            .field(FieldSpec::string("certfile").secret())
            .field(FieldSpec::string("keyfile").secret())
            .field(FieldSpec::new("cron", FieldType::Cron).default_value(DEFAULT_CRON))
            .field(FieldSpec::boolean("watchbydefault").default_value(true))
            .field(FieldSpec::boolean("watchall").default_value(true))
            .field(FieldSpec::boolean("watchatstart").default_value(true))
            .field(FieldSpec::integer("concurrency"))
            .together(&["username", "password"])
            .together(&["certfile", "keyfile"])
    }

    /// Watcher over TCP when `host` is set, over `socket` otherwise.
    pub fn new(identity: ComponentIdentity, config: ComponentConfig, ctx: WatcherContext) -> Result<Self> {
        let source = match config.get_str("host") {
            Some(host) => {
                let tls = TlsFiles {
                    ca: config.get_str("cafile").map(PathBuf::from),
                    cert: config.get_str("certfile").map(PathBuf::from),
                    key: config.get_str("keyfile").map(PathBuf::from),
                };
                let http: Arc<dyn HttpClient> = if tls.is_empty() {
                    Arc::clone(&ctx.http)
                } else {
                    Arc::new(
                        ReqwestClient::with_tls(&tls)
                            .map_err(|e| WatchError::config(identity.id(), e.to_string()))?,
                    )
                };
                DockerSource::new(
                    config.get_str("protocol").unwrap_or("http"),
                    host,
                    config.get_u64("port").unwrap_or(DEFAULT_DOCKER_PORT),
                    http,
                    ctx.resolve_timeout,
                )
            }
            None => socket_source(&identity, &config, ctx.resolve_timeout)?,
        };
        let source = match (config.get_str("username"), config.get_str("password")) {
            (Some(login), Some(password)) => source.with_basic_auth(login, password),
            _ => source,
        };
        Self::with_source(identity, config, Arc::new(source), ctx)
    }

    /// Watcher reading containers from an arbitrary source.
    pub fn with_source(
        identity: ComponentIdentity,
        config: ComponentConfig,
        source: Arc<dyn ContainerSource>,
        ctx: WatcherContext,
    ) -> Result<Self> {
        let schedule = CronSchedule::parse(config.get_str("cron").unwrap_or(DEFAULT_CRON))
            .map_err(|e| WatchError::config(identity.id(), e.to_string()))?;
        let concurrency = config
            .get_u64("concurrency")
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(ctx.concurrency)
            .max(1);

        let runner = CycleRunner {
            id: identity.id(),
            name: identity.name.clone(),
            source,
            watch_by_default: config.get_bool("watchbydefault").unwrap_or(true),
            watch_all: config.get_bool("watchall").unwrap_or(true),
            concurrency,
            ctx,
            guard: tokio::sync::Mutex::new(()),
        };

        Ok(Self {
            watch_at_start: config.get_bool("watchatstart").unwrap_or(true),
            identity,
            config,
            schedule,
            runner: Arc::new(runner),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn host(&self) -> &str {
        self.runner.source.host()
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }
}

#[async_trait]
impl Component for DockerWatcher {
    fn identity(&self) -> &ComponentIdentity {
        &self.identity
    }

    async fn init(&self) -> Result<()> {
        tracing::info!(
            watcher = %self.identity,
            host = %self.host(),
            cron = %self.schedule.expression(),
            "Starting watcher"
        );
        let runner = Arc::clone(&self.runner);
        let handle = schedule::spawn(
            self.identity.id(),
            self.schedule.clone(),
            self.watch_at_start,
            self.cancel.clone(),
            move || {
                let runner = Arc::clone(&runner);
                async move { runner.tick().await }
            },
        );
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(watcher = %self.identity, error = %e, "Schedule task ended abnormally");
            }
        }
        tracing::info!(watcher = %self.identity, "Watcher stopped");
        Ok(())
    }
}

#[async_trait]
impl Watcher for DockerWatcher {
    async fn watch(&self) -> Result<Option<CycleDiff>> {
        self.runner.run_cycle().await
    }

    fn mask_configuration(&self) -> RawConfig {
        self.config.masked()
    }
}

#[cfg(unix)]
fn socket_source(
    _identity: &ComponentIdentity,
    config: &ComponentConfig,
    timeout: Duration,
) -> Result<DockerSource> {
    let path = PathBuf::from(config.get_str("socket").unwrap_or(DEFAULT_DOCKER_SOCKET));
    let http = Arc::new(UnixSocketClient::new(&path));
    Ok(DockerSource::socket(&path, http, timeout))
}

#[cfg(not(unix))]
fn socket_source(
    identity: &ComponentIdentity,
    _config: &ComponentConfig,
    _timeout: Duration,
) -> Result<DockerSource> {
    Err(WatchError::config(
        identity.id(),
        "unix sockets are not supported on this platform, set host",
    ))
}

/// State a cycle needs, shared between the watcher and its schedule task.
struct CycleRunner {
    id: String,
    name: String,
    source: Arc<dyn ContainerSource>,
    ctx: WatcherContext,
    watch_by_default: bool,
    watch_all: bool,
    concurrency: usize,
    guard: tokio::sync::Mutex<()>,
}

impl CycleRunner {
    async fn tick(&self) {
        if let Err(e) = self.run_cycle().await {
            tracing::warn!(watcher = %self.id, error = %e, "Watch cycle failed");
        }
    }

    async fn run_cycle(&self) -> Result<Option<CycleDiff>> {
        let Ok(_running) = self.guard.try_lock() else {
            tracing::warn!(watcher = %self.id, "Previous cycle still running, tick skipped");
            self.ctx.metrics.cycle_skipped(&self.id);
            return Ok(None);
        };

        let cycle_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("watch_cycle", watcher = %self.id, cycle = %cycle_id);
        self.cycle(&cycle_id).instrument(span).await.map(Some)
    }

    async fn cycle(&self, cycle_id: &str) -> Result<CycleDiff> {
        tracing::info!(host = %self.source.host(), "Cycle started");

        // A host that cannot be listed keeps its previous snapshot untouched
        let listed = self.source.list_containers(self.watch_all).await?;
        let watched: Vec<ContainerSummary> = listed
            .into_iter()
            .filter(|c| WatchLabels::from_labels(&c.labels).is_watched(self.watch_by_default))
            .collect();
        tracing::debug!(count = watched.len(), "Containers to watch");

        let observed: Vec<Container> = stream::iter(watched)
            .map(|summary| self.watch_container(summary))
            .buffered(self.concurrency)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        let previous = self
            .ctx
            .snapshots
            .load_last_snapshot(&self.id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Cannot load previous snapshot, treating all containers as new");
                Vec::new()
            });
        let outcome = diff(&previous, observed);
        if let Err(e) = self.ctx.snapshots.save_snapshot(&self.id, &outcome.snapshot).await {
            tracing::warn!(error = %e, "Cannot save snapshot");
        }

        for report in &outcome.reports {
            self.ctx.events.emit(WatchEvent::ContainerReport(report.clone()));
        }
        let stats = outcome.stats();
        self.ctx.metrics.cycle_completed(&self.id, &stats);
        self.ctx
            .events
            .emit(WatchEvent::cycle_completed(self.id.clone(), cycle_id, stats));
        tracing::info!(%stats, "Cycle finished");
        Ok(outcome)
    }

    /// Inspect and resolve one container. Failures become an error marker on
    /// the container, never a cycle failure.
    async fn watch_container(&self, summary: ContainerSummary) -> Option<Container> {
        let timeout = self.ctx.resolve_timeout;
        let inspected = tokio::time::timeout(timeout, self.inspect(&summary))
            .await
            .unwrap_or_else(|_| {
                Err(WatchError::Timeout(format!(
                    "inspecting container {}",
                    summary.display_name()
                )))
            });
        let container = match inspected {
            Ok(Some(container)) => container,
            Ok(None) => return None,
            Err(e) => return Some(errored(placeholder(&self.name, &summary), &e)),
        };

        let fallback = container.clone();
        match tokio::time::timeout(timeout, self.ctx.resolver.resolve(container)).await {
            Ok(Ok(resolved)) => {
                if resolved.update_available {
                    tracing::debug!(
                        container = %resolved.name,
                        kind = resolved.update_kind.as_str(),
                        "Update available"
                    );
                }
                Some(resolved)
            }
            Ok(Err(e)) => Some(errored(fallback, &e)),
            Err(_) => {
                let e = WatchError::Timeout(format!("resolving container {}", fallback.name));
                Some(errored(fallback, &e))
            }
        }
    }

    async fn inspect(&self, summary: &ContainerSummary) -> Result<Option<Container>> {
        let details = self.source.get_container_image(summary).await?;
        let Some(mut container) = to_container(&self.name, summary, &details)? else {
            return Ok(None);
        };
        container.image = self.ctx.resolver.normalize(&container.image);
        Ok(Some(container))
    }
}

/// Minimal container for one whose image could not be inspected.
fn placeholder(watcher: &str, summary: &ContainerSummary) -> Container {
    Container {
        id: summary.id.clone(),
        name: summary.display_name().to_string(),
        watcher: watcher.to_string(),
        status: summary.state.clone(),
        image: Image {
            name: summary.image.clone(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn errored(mut container: Container, error: &WatchError) -> Container {
    tracing::warn!(container = %container.name, error = %error, "Cannot resolve container");
    container.error = Some(ContainerError::from(error));
    container.update_available = false;
    container.update_kind = UpdateKind::Unknown;
    container.link = None;
    container
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Method};
    use crate::registry::{self, ProviderContext, RegistryProvider};
    use crate::testing::StubHttpClient;
    use serde_json::json;
    use shipwatch_core::component::{ComponentRegistry, Kind};
    use shipwatch_core::error::ErrorKind;

    const DOCKER: &str = "http://docker.local:2375";
    const REGISTRY: &str = "https://registry.example.org/v2";

    struct Fixture {
        watcher: DockerWatcher,
        stub: StubHttpClient,
        events: EventEmitter,
        metrics: EngineMetrics,
        snapshots: Arc<MemorySnapshotStore>,
    }

    async fn fixture(raw: serde_json::Value) -> Fixture {
        let stub = StubHttpClient::new();
        let http: Arc<dyn HttpClient> = Arc::new(stub.clone());
        let registries = Arc::new(ComponentRegistry::<dyn RegistryProvider>::new(Kind::Registry));
        let provider_raw: RawConfig =
            serde_json::from_value(json!({"url": "https://registry.example.org"})).unwrap();
        let ctx = ProviderContext {
            http: Arc::clone(&http),
            auth_timeout: Duration::from_secs(5),
        };
        registries
            .register(
                ComponentIdentity::new(Kind::Registry, "custom", "corp"),
                &provider_raw,
                &registry::schema("custom", &provider_raw).unwrap(),
                |identity, config| registry::build(identity, config, &ctx, false),
            )
            .await
            .unwrap();

        let events = EventEmitter::new(64);
        let metrics = EngineMetrics::new().unwrap();
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let watcher_ctx = WatcherContext {
            resolver: ImageResolver::new(registries),
            snapshots: snapshots.clone(),
            events: events.clone(),
            metrics: metrics.clone(),
            http,
            concurrency: 4,
            resolve_timeout: Duration::from_secs(5),
        };
        let raw: RawConfig = serde_json::from_value(raw).unwrap();
        let config = DockerWatcher::schema().validate(&raw).unwrap();
        let watcher = DockerWatcher::new(
            ComponentIdentity::new(Kind::Watcher, "docker", "local"),
            config,
            watcher_ctx,
        )
        .unwrap();

        Fixture {
            watcher,
            stub,
            events,
            metrics,
            snapshots,
        }
    }

    fn docker_config() -> serde_json::Value {
        json!({"host": "docker.local", "watchatstart": false})
    }

    fn serve_host(stub: &StubHttpClient) {
        stub.on(
            Method::Get,
            &format!("{}/containers/json?all=true", DOCKER),
            HttpResponse::new(
                200,
                json!([
                    {"Id": "c-web", "Names": ["/web"], "Image": "registry.example.org/team/web:1.9.0",
                     "State": "running", "Labels": {}},
                    {"Id": "c-api", "Names": ["/api"], "Image": "registry.example.org/team/api:2.0.0",
                     "State": "running", "Labels": {}},
                    {"Id": "c-skip", "Names": ["/skip"], "Image": "registry.example.org/team/skip:1.0.0",
                     "State": "running", "Labels": {"shipwatch.watch": "false"}}
                ])
                .to_string(),
            ),
        );
        for (name, tag) in [("web", "1.9.0"), ("api", "2.0.0")] {
            stub.on(
                Method::Get,
                &format!("{}/images/registry.example.org/team/{}:{}/json", DOCKER, name, tag),
                HttpResponse::new(
                    200,
                    json!({"Id": format!("sha256:{}", name), "Os": "linux", "Architecture": "amd64"})
                        .to_string(),
                ),
            );
        }
        tags(stub, "web", &["1.2.3", "1.9.0", "1.10.0"]);
        tags(stub, "api", &["1.0.0", "2.0.0"]);
    }

    fn tags(stub: &StubHttpClient, name: &str, list: &[&str]) {
        stub.on(
            Method::Get,
            &format!("{}/team/{}/tags/list?n=1000", REGISTRY, name),
            HttpResponse::new(200, json!({"tags": list}).to_string()),
        );
    }

    fn report<'a>(outcome: &'a CycleDiff, id: &str) -> &'a shipwatch_core::model::ContainerReport {
        outcome
            .reports
            .iter()
            .find(|r| r.container.id == id)
            .unwrap()
    }

    #[test]
    fn test_schema_defaults() {
        let config = DockerWatcher::schema().validate(&RawConfig::new()).unwrap();
        assert_eq!(config.get_str("socket"), Some("/var/run/docker.sock"));
        assert_eq!(config.get_str("host"), None);
        assert_eq!(config.get_str("protocol"), Some("http"));
        assert_eq!(config.get_u64("port"), Some(2375));
        assert_eq!(config.get_str("cron"), Some(DEFAULT_CRON));
        assert_eq!(config.get_bool("watchbydefault"), Some(true));
        assert_eq!(config.get_bool("watchall"), Some(true));
        assert_eq!(config.get_bool("watchatstart"), Some(true));
        assert_eq!(config.get_str("username"), None);
        assert_eq!(config.get_str("cafile"), None);
    }

    #[test]
    fn test_credentials_and_tls_paths_masked() {
        let raw: RawConfig = serde_json::from_value(json!({
            "host": "docker.example.org", "protocol": "https", "port": 2376,
            "username": "admin", "password": "hunter2",
            "cafile": "/certs/ca.pem", "certfile": "/certs/cert.pem", "keyfile": "/certs/key.pem"
        }))
        .unwrap();
        let masked = DockerWatcher::schema().validate(&raw).unwrap().masked();
        assert_eq!(masked["username"], "admin");
        assert_eq!(masked["host"], "docker.example.org");
        for (field, secret) in [
            ("password", "hunter2"),
            ("cafile", "/certs/ca.pem"),
            ("certfile", "/certs/cert.pem"),
            ("keyfile", "/certs/key.pem"),
        ] {
            assert_ne!(masked[field], secret, "{} must be masked", field);
        }
    }

    #[test]
    fn test_credentials_must_be_paired() {
        let raw: RawConfig = serde_json::from_value(json!({"username": "admin"})).unwrap();
        let err = DockerWatcher::schema().validate(&raw).unwrap_err();
        assert!(err.to_string().contains("password"));

        let raw: RawConfig = serde_json::from_value(json!({"certfile": "/certs/cert.pem"})).unwrap();
        assert!(DockerWatcher::schema().validate(&raw).is_err());
    }

    #[test]
    fn test_schema_rejects_bad_values() {
        let raw: RawConfig = serde_json::from_value(json!({"cron": "often"})).unwrap();
        let err = DockerWatcher::schema().validate(&raw).unwrap_err();
        assert!(err.to_string().starts_with("field cron is invalid"));

        let raw: RawConfig = serde_json::from_value(json!({"protocol": "ftp"})).unwrap();
        assert!(DockerWatcher::schema().validate(&raw).is_err());
    }

    #[test]
    fn test_unknown_type() {
        assert!(schema("podman").is_err());
        assert!(schema("docker").is_ok());
    }

    #[tokio::test]
    async fn test_cycle_resolves_watched_containers() {
        let f = fixture(docker_config()).await;
        serve_host(&f.stub);

        let outcome = f.watcher.watch().await.unwrap().unwrap();
        assert_eq!(outcome.reports.len(), 2);

        let web = report(&outcome, "c-web");
        assert!(web.changed);
        assert!(web.container.update_available);
        assert_eq!(web.container.result.as_ref().unwrap().tag, "1.10.0");
        assert_eq!(web.container.watcher, "local");
        assert_eq!(web.container.image.registry.name, "custom.corp");

        let api = report(&outcome, "c-api");
        assert!(!api.container.update_available);

        let stats = outcome.stats();
        assert_eq!((stats.watched, stats.errors, stats.updates), (2, 0, 1));
        assert_eq!(f.metrics.cycles_run("watcher.docker.local"), 1);
        assert_eq!(
            f.snapshots.load_last_snapshot("watcher.docker.local").await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_second_cycle_reports_no_change() {
        let f = fixture(docker_config()).await;
        serve_host(&f.stub);

        f.watcher.watch().await.unwrap();
        let second = f.watcher.watch().await.unwrap().unwrap();
        assert!(second.reports.iter().all(|r| !r.changed));
        assert!(report(&second, "c-web").container.update_available);
    }

    #[tokio::test]
    async fn test_registry_failure_is_isolated() {
        let f = fixture(docker_config()).await;
        serve_host(&f.stub);
        f.stub.clear(Method::Get, &format!("{}/team/api/tags/list?n=1000", REGISTRY));
        f.stub
            .unreachable(Method::Get, &format!("{}/team/api/tags/list?n=1000", REGISTRY));

        let outcome = f.watcher.watch().await.unwrap().unwrap();
        let api = report(&outcome, "c-api");
        assert_eq!(api.container.error.as_ref().unwrap().kind, ErrorKind::Network);
        assert!(!api.container.update_available);

        let web = report(&outcome, "c-web");
        assert!(!web.container.is_errored());
        assert!(web.container.update_available);
        assert_eq!(outcome.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_inspection_failure_yields_placeholder() {
        let f = fixture(docker_config()).await;
        serve_host(&f.stub);
        let url = format!("{}/images/registry.example.org/team/web:1.9.0/json", DOCKER);
        f.stub.clear(Method::Get, &url);
        f.stub.unreachable(Method::Get, &url);

        let outcome = f.watcher.watch().await.unwrap().unwrap();
        let web = report(&outcome, "c-web");
        assert!(web.container.is_errored());
        assert_eq!(web.container.name, "web");
        assert_eq!(web.container.image.name, "registry.example.org/team/web:1.9.0");
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_cycle_and_keeps_snapshot() {
        let f = fixture(docker_config()).await;
        serve_host(&f.stub);
        f.watcher.watch().await.unwrap();

        let list = format!("{}/containers/json?all=true", DOCKER);
        f.stub.clear(Method::Get, &list);
        f.stub.unreachable(Method::Get, &list);
        assert!(f.watcher.watch().await.is_err());
        assert_eq!(
            f.snapshots.load_last_snapshot("watcher.docker.local").await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let f = fixture(docker_config()).await;
        serve_host(&f.stub);

        let _running = f.watcher.runner.guard.lock().await;
        assert!(f.watcher.watch().await.unwrap().is_none());
        assert_eq!(f.metrics.cycles_skipped("watcher.docker.local"), 1);
        assert_eq!(f.metrics.cycles_run("watcher.docker.local"), 0);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let f = fixture(docker_config()).await;
        serve_host(&f.stub);
        let mut rx = f.events.subscribe();

        f.watcher.watch().await.unwrap();

        let mut reports = 0;
        loop {
            match rx.recv().await.unwrap() {
                WatchEvent::ContainerReport(_) => reports += 1,
                WatchEvent::CycleCompleted { watcher, stats, .. } => {
                    assert_eq!(watcher, "watcher.docker.local");
                    assert_eq!(stats.watched, 2);
                    break;
                }
            }
        }
        assert_eq!(reports, 2);
    }

    #[tokio::test]
    async fn test_running_only_when_watchall_disabled() {
        let f = fixture(json!({"host": "docker.local", "watchatstart": false, "watchall": false})).await;
        f.stub.on(
            Method::Get,
            &format!("{}/containers/json?all=false", DOCKER),
            HttpResponse::new(200, "[]"),
        );
        let outcome = f.watcher.watch().await.unwrap().unwrap();
        assert!(outcome.reports.is_empty());
        assert_eq!(f.stub.requests_to(DOCKER).len(), 1);
    }

    #[tokio::test]
    async fn test_docker_basic_auth() {
        let f = fixture(json!({
            "host": "docker.local", "watchatstart": false,
            "username": "admin", "password": "hunter2"
        }))
        .await;
        serve_host(&f.stub);
        f.watcher.watch().await.unwrap();
        let listed = &f.stub.requests_to(&format!("{}/containers/json", DOCKER))[0];
        assert_eq!(listed.authorization(), Some("Basic YWRtaW46aHVudGVyMg=="));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_socket_is_default_transport() {
        let f = fixture(json!({"watchatstart": false})).await;
        assert_eq!(f.watcher.host(), DEFAULT_DOCKER_SOCKET);

        let f = fixture(json!({"socket": "/run/user/1000/docker.sock", "watchatstart": false})).await;
        assert_eq!(f.watcher.host(), "/run/user/1000/docker.sock");
    }

    #[tokio::test]
    async fn test_unreadable_tls_files_rejected() {
        let raw: RawConfig = serde_json::from_value(json!({
            "host": "docker.local", "protocol": "https", "port": 2376,
            "cafile": "/nonexistent/ca.pem"
        }))
        .unwrap();
        let config = DockerWatcher::schema().validate(&raw).unwrap();
        let f = fixture(docker_config()).await;
        let err = DockerWatcher::new(
            ComponentIdentity::new(Kind::Watcher, "docker", "remote"),
            config,
            f.watcher.runner.ctx.clone(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, WatchError::Configuration { .. }));
        assert!(err.to_string().contains("/nonexistent/ca.pem"));
    }

    #[tokio::test]
    async fn test_init_runs_at_start_and_deregister_stops() {
        let f = fixture(json!({"host": "docker.local", "cron": "0 0 1 1 *"})).await;
        serve_host(&f.stub);
        let mut rx = f.events.subscribe();

        f.watcher.init().await.unwrap();
        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(WatchEvent::CycleCompleted { .. }) = rx.recv().await {
                    break;
                }
            }
        })
        .await;
        assert!(completed.is_ok());

        f.watcher.deregister().await.unwrap();
        assert!(f.watcher.task.lock().is_none());
    }
}
