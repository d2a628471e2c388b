//! Engine root: owns the component registries and their shared collaborators.
//!
//! Everything a component needs (HTTP client, event bus, metrics, snapshot
//! store, resolver) is created here and injected at registration; nothing is
//! global. Registration is scoped per component: a rejected configuration
//! fails that one registration and leaves every other component running.

use std::sync::Arc;

use shipwatch_core::component::{Component, ComponentIdentity, ComponentRegistry, Kind, RawConfig};
use shipwatch_core::config::{ComponentSettings, EngineConfig, EngineSettings};
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::event::{EventEmitter, WatchEvent};
use shipwatch_core::model::{Container, ContainerReport, Image, RegistryRef, TagInfo};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::http::{HttpClient, ReqwestClient};
use crate::metrics::EngineMetrics;
use crate::oci::ImageReference;
use crate::registry::{self, ProviderContext, RegistryProvider, DEFAULT_PROVIDERS};
use crate::resolver::{parse_semver, ImageResolver, Resolution};
use crate::trigger::{self, TriggerContext, TriggerDispatcher};
use crate::watcher::{self, FileSnapshotStore, MemorySnapshotStore, SnapshotStore, Watcher, WatcherContext};

/// Subscriber label of [`WatchEngine::on_container_report`] callbacks in metrics.
const REPORT_CALLBACK: &str = "report-callback";

/// Outcome of [`WatchEngine::register_all`].
#[derive(Debug, Default)]
pub struct RegistrationSummary {
    pub registered: Vec<String>,
    pub failed: Vec<(String, WatchError)>,
}

impl RegistrationSummary {
    fn record<T>(&mut self, id: String, outcome: Result<T>) {
        match outcome {
            Ok(_) => self.registered.push(id),
            Err(e) => self.failed.push((id, e)),
        }
    }
}

/// Container image watch engine.
pub struct WatchEngine {
    settings: EngineSettings,
    http: Arc<dyn HttpClient>,
    events: EventEmitter,
    metrics: EngineMetrics,
    snapshots: Arc<dyn SnapshotStore>,
    registries: Arc<ComponentRegistry<dyn RegistryProvider>>,
    watchers: ComponentRegistry<dyn Watcher>,
    triggers: ComponentRegistry<TriggerDispatcher>,
    resolver: ImageResolver,
    cancel: CancellationToken,
}

impl WatchEngine {
    /// Engine talking to the network through reqwest.
    pub fn new(settings: EngineSettings) -> Result<Self> {
        Self::with_http_client(settings, Arc::new(ReqwestClient::new()?))
    }

    /// Engine using `http` for every registry, Docker and trigger call.
    pub fn with_http_client(settings: EngineSettings, http: Arc<dyn HttpClient>) -> Result<Self> {
        settings.validate()?;
        let snapshots: Arc<dyn SnapshotStore> = match &settings.snapshot_dir {
            Some(dir) => Arc::new(FileSnapshotStore::new(dir.clone())),
            None => Arc::new(MemorySnapshotStore::new()),
        };
        let registries = Arc::new(ComponentRegistry::new(Kind::Registry));
        let events = EventEmitter::new(settings.event_capacity);
        Ok(Self {
            resolver: ImageResolver::new(Arc::clone(&registries)),
            settings,
            http,
            events,
            metrics: EngineMetrics::new()?,
            snapshots,
            registries,
            watchers: ComponentRegistry::new(Kind::Watcher),
            triggers: ComponentRegistry::new(Kind::Trigger),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the snapshot store. Only affects watchers registered afterwards.
    pub fn with_snapshot_store(mut self, snapshots: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn resolver(&self) -> &ImageResolver {
        &self.resolver
    }

    pub fn registries(&self) -> Vec<Arc<dyn RegistryProvider>> {
        self.registries.list()
    }

    pub fn watchers(&self) -> Vec<Arc<dyn Watcher>> {
        self.watchers.list()
    }

    pub fn triggers(&self) -> Vec<Arc<TriggerDispatcher>> {
        self.triggers.list()
    }

    pub fn watcher(&self, id: &str) -> Option<Arc<dyn Watcher>> {
        self.watchers.get(id)
    }

    pub async fn register_registry(&self, settings: &ComponentSettings) -> Result<Arc<dyn RegistryProvider>> {
        self.add_registry(settings, false).await
    }

    /// Register anonymous `hub`, `ghcr`, `quay` and public `ecr` instances for
    /// the types that have no configured instance.
    pub async fn register_default_registries(&self) -> Result<()> {
        if !self.settings.default_registries {
            return Ok(());
        }
        for (type_name, name) in DEFAULT_PROVIDERS {
            let configured = self
                .registries
                .find(|p| p.identity().type_name == *type_name)
                .is_some();
            if !configured {
                let settings = ComponentSettings::new(*type_name, *name, RawConfig::new());
                self.add_registry(&settings, true).await?;
            }
        }
        Ok(())
    }

    async fn add_registry(&self, settings: &ComponentSettings, default: bool) -> Result<Arc<dyn RegistryProvider>> {
        let identity = ComponentIdentity::new(Kind::Registry, &settings.type_name, &settings.name);
        let schema = registry::schema(&identity.type_name, &settings.config)
            .map_err(|e| WatchError::config(identity.id(), e.to_string()))?;
        let ctx = ProviderContext {
            http: Arc::clone(&self.http),
            auth_timeout: self.settings.auth_timeout(),
        };
        let provider = self
            .registries
            .register(identity, &settings.config, &schema, |identity, config| {
                registry::build(identity, config, &ctx, default)
            })
            .await?;
        tracing::info!(
            registry = %provider.id(),
            config = ?provider.mask_configuration(),
            "Registry registered"
        );
        Ok(provider)
    }

    /// Register a watcher. Its schedule starts immediately.
    pub async fn register_watcher(&self, settings: &ComponentSettings) -> Result<Arc<dyn Watcher>> {
        let identity = ComponentIdentity::new(Kind::Watcher, &settings.type_name, &settings.name);
        let schema = watcher::schema(&identity.type_name)?;
        let ctx = WatcherContext {
            resolver: self.resolver.clone(),
            snapshots: Arc::clone(&self.snapshots),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            http: Arc::clone(&self.http),
            concurrency: self.settings.concurrency,
            resolve_timeout: self.settings.resolve_timeout(),
        };
        let watcher = self
            .watchers
            .register(identity, &settings.config, &schema, |identity, config| {
                watcher::build(identity, config, &ctx)
            })
            .await?;
        tracing::info!(
            watcher = %watcher.id(),
            config = ?watcher.mask_configuration(),
            "Watcher registered"
        );
        Ok(watcher)
    }

    /// Register a trigger. It receives reports emitted from now on.
    pub async fn register_trigger(&self, settings: &ComponentSettings) -> Result<Arc<TriggerDispatcher>> {
        let identity = ComponentIdentity::new(Kind::Trigger, &settings.type_name, &settings.name);
        let schema = trigger::schema(&identity.type_name)?;
        let ctx = TriggerContext {
            http: Arc::clone(&self.http),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
        };
        let dispatcher = self
            .triggers
            .register(identity, &settings.config, &schema, |identity, config| {
                trigger::build(identity, config, &ctx)
            })
            .await?;
        tracing::info!(
            trigger = %dispatcher.id(),
            config = ?dispatcher.mask_configuration(),
            "Trigger registered"
        );
        Ok(dispatcher)
    }

    /// Register every component of a configuration.
    ///
    /// Registries come first, then triggers so they hear the first cycle,
    /// then watchers. Failures are collected, not propagated.
    pub async fn register_all(&self, config: &EngineConfig) -> RegistrationSummary {
        let mut summary = RegistrationSummary::default();
        for settings in config.registry_settings() {
            let id = ComponentIdentity::new(Kind::Registry, &settings.type_name, &settings.name).id();
            summary.record(id, self.register_registry(&settings).await);
        }
        if let Err(e) = self.register_default_registries().await {
            summary.failed.push(("registry.defaults".to_string(), e));
        }
        for settings in config.trigger_settings() {
            let id = ComponentIdentity::new(Kind::Trigger, &settings.type_name, &settings.name).id();
            summary.record(id, self.register_trigger(&settings).await);
        }
        for settings in config.watcher_settings() {
            let id = ComponentIdentity::new(Kind::Watcher, &settings.type_name, &settings.name).id();
            summary.record(id, self.register_watcher(&settings).await);
        }
        for (id, error) in &summary.failed {
            tracing::warn!(component = %id, error = %error, "Component not registered");
        }
        summary
    }

    /// Call `callback` for every container report until shutdown.
    pub fn on_container_report<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(ContainerReport) + Send + Sync + 'static,
    {
        let mut stream = self
            .events
            .subscribe_filtered(|event| matches!(event, WatchEvent::ContainerReport(_)));
        let cancel = self.cancel.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = stream.recv() => {
                        let skipped = stream.take_skipped();
                        if skipped > 0 {
                            metrics.events_lagged(REPORT_CALLBACK, skipped);
                        }
                        match event {
                            Some(WatchEvent::ContainerReport(report)) => callback(report),
                            Some(_) => {}
                            None => break,
                        }
                    }
                }
            }
        })
    }

    /// Update candidates for one image reference, using the registered
    /// registries. Digests are not compared.
    pub async fn resolve_reference(&self, reference: &str) -> Result<(Image, Resolution)> {
        let parsed = ImageReference::parse(reference)?;
        let tag = parsed.tag_or_default().to_string();
        let image = Image {
            name: parsed.repository.clone(),
            registry: RegistryRef {
                name: registry::UNKNOWN_REGISTRY.to_string(),
                url: parsed.registry.clone(),
            },
            tag: TagInfo {
                semver: parse_semver(&tag).is_some(),
                value: tag,
            },
            ..Default::default()
        };
        let container = Container {
            id: reference.to_string(),
            name: parsed.repository,
            image: self.resolver.normalize(&image),
            ..Default::default()
        };
        let resolution = self.resolver.find_new_version(&container).await?;
        Ok((container.image, resolution))
    }

    /// Prometheus text exposition of the engine metrics.
    pub fn metrics_text(&self) -> Result<String> {
        self.metrics.encode_text()
    }

    /// Stop every schedule and event loop, then drop all components.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down watch engine");
        self.cancel.cancel();
        self.watchers.deregister_all().await;
        self.triggers.deregister_all().await;
        self.registries.deregister_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Method};
    use crate::testing::StubHttpClient;
    use serde_json::json;

    fn engine(settings: EngineSettings) -> (WatchEngine, StubHttpClient) {
        let stub = StubHttpClient::new();
        let engine = WatchEngine::with_http_client(settings, Arc::new(stub.clone())).unwrap();
        (engine, stub)
    }

    fn raw(value: serde_json::Value) -> RawConfig {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_default_registries() {
        let (engine, _) = engine(EngineSettings::default());
        engine
            .register_registry(&ComponentSettings::new(
                "ghcr",
                "private",
                raw(json!({"username": "me", "token": "ghp_x"})),
            ))
            .await
            .unwrap();
        engine.register_default_registries().await.unwrap();

        let mut ids: Vec<String> = engine.registries().iter().map(|p| p.id()).collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![
                "registry.ecr.public",
                "registry.ghcr.private",
                "registry.hub.public",
                "registry.quay.public"
            ]
        );
        let hub = engine.registries.get("registry.hub.public").unwrap();
        assert!(hub.descriptor().default);
    }

    #[tokio::test]
    async fn test_default_registries_disabled() {
        let settings = EngineSettings {
            default_registries: false,
            ..Default::default()
        };
        let (engine, _) = engine(settings);
        engine.register_default_registries().await.unwrap();
        assert!(engine.registries().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_component_is_scoped() {
        let (engine, _) = engine(EngineSettings::default());
        let config = EngineConfig::from_yaml_str(
            r#"
registries:
  aws:
    type: ecr
    accesskeyid: AKIA
    secretaccesskey: secret
triggers:
  ops:
    type: webhook
    url: https://hooks.example.org/x
watchers:
  local:
    type: docker
    host: docker.local
    watchatstart: false
"#,
        )
        .unwrap();

        let summary = engine.register_all(&config).await;
        assert_eq!(summary.failed.len(), 1);
        let (id, error) = &summary.failed[0];
        assert_eq!(id, "registry.ecr.aws");
        assert!(error.to_string().contains("field region is required"));
        assert!(summary.registered.contains(&"watcher.docker.local".to_string()));
        assert!(summary.registered.contains(&"trigger.webhook.ops".to_string()));

        // The anonymous public ECR instance still fills the gap
        assert!(engine.registries.get("registry.ecr.public").is_some());
        engine.shutdown().await;
        assert!(engine.watchers().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_types_rejected() {
        let (engine, _) = engine(EngineSettings::default());
        assert!(engine
            .register_watcher(&ComponentSettings::new("kubernetes", "k", RawConfig::new()))
            .await
            .is_err());
        assert!(engine
            .register_trigger(&ComponentSettings::new("pager", "p", RawConfig::new()))
            .await
            .is_err());
        assert!(engine
            .register_registry(&ComponentSettings::new("harbor", "h", RawConfig::new()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_type_name_is_case_insensitive() {
        let (engine, _) = engine(EngineSettings::default());
        let provider = engine
            .register_registry(&ComponentSettings::new(
                "ECR",
                "aws",
                raw(json!({
                    "accessKeyId": "AKIA",
                    "secretAccessKey": "secret",
                    "Region": "eu-west-1"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(provider.id(), "registry.ecr.aws");

        let error = engine
            .register_registry(&ComponentSettings::new(
                "Ecr",
                "broken",
                raw(json!({"accessKeyId": "AKIA", "secretAccessKey": "secret"})),
            ))
            .await
            .err()
            .unwrap();
        assert!(error.to_string().contains("field region is required"));
    }

    #[tokio::test]
    async fn test_resolve_reference() {
        let (engine, stub) = engine(EngineSettings::default());
        engine
            .register_registry(&ComponentSettings::new(
                "custom",
                "corp",
                raw(json!({"url": "https://registry.example.org"})),
            ))
            .await
            .unwrap();
        stub.on(
            Method::Get,
            "https://registry.example.org/v2/team/app/tags/list?n=1000",
            HttpResponse::new(200, json!({"tags": ["1.2.3", "1.9.0", "1.10.0"]}).to_string()),
        );

        let (image, resolution) = engine
            .resolve_reference("registry.example.org/team/app:1.2.3")
            .await
            .unwrap();
        assert_eq!(image.registry.name, "custom.corp");
        assert_eq!(resolution.candidates, vec!["1.10.0", "1.9.0"]);
        assert_eq!(resolution.result.tag, "1.10.0");
    }

    #[tokio::test]
    async fn test_metrics_text() {
        let (engine, _) = engine(EngineSettings::default());
        engine.metrics().cycle_skipped("watcher.docker.local");
        let text = engine.metrics_text().unwrap();
        assert!(text.contains("shipwatch_cycles_skipped_total"));
    }

    #[test]
    fn test_invalid_settings() {
        let settings = EngineSettings {
            concurrency: 0,
            ..Default::default()
        };
        assert!(WatchEngine::with_http_client(settings, Arc::new(StubHttpClient::new())).is_err());
    }
}
