//! Trigger dispatch.
//!
//! A trigger turns container reports into notifications. Each registered
//! trigger owns a [`TriggerDispatcher`] that listens on the engine's event
//! bus and hands qualifying containers to its delivery provider, either one
//! at a time (`simple`) or aggregated over watcher cycles (`batch`).
//!
//! A report qualifies when the container has an update, is neither errored
//! nor removed, passes the trigger's threshold and, with `once` (default),
//! actually changed this cycle. Failed deliveries are logged and counted,
//! never retried.

pub mod chat;
pub mod template;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use handlebars::RenderError;
use parking_lot::Mutex;
use shipwatch_core::component::{
    Component, ComponentConfig, ComponentIdentity, ConfigSchema, FieldSpec, FieldType, RawConfig,
};
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::event::{EventEmitter, WatchEvent};
use shipwatch_core::model::{Container, ContainerReport, SemverDiff, UpdateKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::http::{HttpClient, RequestOptions};
use crate::metrics::EngineMetrics;
use template::Templates;

/// Trigger types known to the factory.
pub const TRIGGER_TYPES: &[&str] = &["chat", "webhook"];

/// Shared collaborators handed to every trigger at construction.
#[derive(Clone)]
pub struct TriggerContext {
    pub http: Arc<dyn HttpClient>,
    pub events: EventEmitter,
    pub metrics: EngineMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Simple,
    Batch,
}

/// Semver changes a trigger notifies about.
///
/// `major` keeps only major bumps. `minor` drops major bumps and `patch`
/// drops major and minor bumps. Digest updates and tags without a semver
/// classification always pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    All,
    Major,
    Minor,
    Patch,
}

impl Threshold {
    fn parse(value: &str) -> Self {
        match value {
            "major" => Threshold::Major,
            "minor" => Threshold::Minor,
            "patch" => Threshold::Patch,
            _ => Threshold::All,
        }
    }

    pub fn accepts(&self, kind: &UpdateKind) -> bool {
        let diff = match kind.semver_diff() {
            Some(diff) if diff != SemverDiff::Unknown => diff,
            _ => return true,
        };
        match self {
            Threshold::All => true,
            Threshold::Major => diff == SemverDiff::Major,
            Threshold::Minor => diff != SemverDiff::Major,
            Threshold::Patch => diff != SemverDiff::Major && diff != SemverDiff::Minor,
        }
    }
}

/// Dispatch settings common to every trigger type.
#[derive(Debug, Clone)]
pub struct TriggerSettings {
    pub mode: Mode,
    pub once: bool,
    pub threshold: Threshold,
    pub simple_title: String,
    pub simple_body: String,
    pub batch_title: String,
    /// Watcher cycles between two batch flushes.
    pub batch_flush: usize,
}

impl TriggerSettings {
    pub fn from_config(config: &ComponentConfig) -> Self {
        Self {
            mode: match config.get_str("mode") {
                Some("batch") => Mode::Batch,
                _ => Mode::Simple,
            },
            once: config.get_bool("once").unwrap_or(true),
            threshold: Threshold::parse(config.get_str("threshold").unwrap_or("all")),
            simple_title: config
                .get_str("simpletitle")
                .unwrap_or(template::DEFAULT_SIMPLE_TITLE)
                .to_string(),
            simple_body: config
                .get_str("simplebody")
                .unwrap_or(template::DEFAULT_SIMPLE_BODY)
                .to_string(),
            batch_title: config
                .get_str("batchtitle")
                .unwrap_or(template::DEFAULT_BATCH_TITLE)
                .to_string(),
            batch_flush: config
                .get_u64("batchflush")
                .map(|n| n as usize)
                .unwrap_or(1)
                .max(1),
        }
    }

    /// Whether a report should produce a notification.
    pub fn should_notify(&self, report: &ContainerReport) -> bool {
        let container = &report.container;
        !report.removed
            && !container.is_errored()
            && container.update_available
            && (report.changed || !self.once)
            && self.threshold.accepts(&container.update_kind)
    }
}

/// Add the dispatch fields shared by every trigger type.
fn with_common_fields(schema: ConfigSchema) -> ConfigSchema {
    schema
        .field(FieldSpec::new("mode", FieldType::Enum(&["simple", "batch"])).default_value("simple"))
        .field(FieldSpec::boolean("once").default_value(true))
        .field(
            FieldSpec::new("threshold", FieldType::Enum(&["all", "major", "minor", "patch"]))
                .default_value("all"),
        )
        .field(FieldSpec::string("simpletitle").default_value(template::DEFAULT_SIMPLE_TITLE))
        .field(FieldSpec::string("simplebody").default_value(template::DEFAULT_SIMPLE_BODY))
        .field(FieldSpec::string("batchtitle").default_value(template::DEFAULT_BATCH_TITLE))
        .field(FieldSpec::integer("batchflush").default_value(1))
}

/// Configuration schema for a trigger type.
pub fn schema(type_name: &str) -> Result<ConfigSchema> {
    let specific = match type_name {
        "chat" => chat::Chat::schema(),
        "webhook" => webhook::Webhook::schema(),
        other => {
            return Err(WatchError::config(
                format!("trigger.{}", other),
                format!("unknown trigger type '{}'", other),
            ))
        }
    };
    Ok(with_common_fields(specific))
}

/// Construct a trigger and its dispatcher from a validated configuration.
pub fn build(
    identity: ComponentIdentity,
    config: ComponentConfig,
    ctx: &TriggerContext,
) -> Result<Arc<TriggerDispatcher>> {
    let type_name = identity.type_name.clone();
    let base = TriggerBase::new(identity, config, Arc::clone(&ctx.http))?;
    let trigger: Arc<dyn Trigger> = match type_name.as_str() {
        "chat" => Arc::new(chat::Chat::new(base)),
        "webhook" => Arc::new(webhook::Webhook::new(base)),
        other => {
            return Err(WatchError::config(
                base.identity.id(),
                format!("unknown trigger type '{}'", other),
            ))
        }
    };
    Ok(Arc::new(TriggerDispatcher::new(
        trigger,
        ctx.events.clone(),
        ctx.metrics.clone(),
    )))
}

/// Delivery provider: sends rendered notifications somewhere.
#[async_trait]
pub trait Trigger: Send + Sync {
    fn base(&self) -> &TriggerBase;

    /// Notify about one container.
    async fn trigger(&self, container: &Container) -> Result<()>;

    /// Notify about several containers in one message.
    async fn trigger_batch(&self, containers: &[Container]) -> Result<()>;

    /// Configuration with every credential field masked.
    fn mask_configuration(&self) -> RawConfig {
        self.base().config.masked()
    }
}

/// Identity, configuration and HTTP access of one trigger.
pub struct TriggerBase {
    pub identity: ComponentIdentity,
    pub config: ComponentConfig,
    pub settings: TriggerSettings,
    pub http: Arc<dyn HttpClient>,
    templates: Templates,
}

impl TriggerBase {
    /// Fails when one of the title or body templates does not compile.
    pub fn new(identity: ComponentIdentity, config: ComponentConfig, http: Arc<dyn HttpClient>) -> Result<Self> {
        let settings = TriggerSettings::from_config(&config);
        let templates = Templates::new(&settings.simple_title, &settings.simple_body, &settings.batch_title)
            .map_err(|e| WatchError::config(identity.id(), format!("invalid template: {}", e)))?;
        Ok(Self {
            identity,
            config,
            settings,
            http,
            templates,
        })
    }

    fn rendered(&self, outcome: std::result::Result<String, RenderError>) -> Result<String> {
        outcome.map_err(|e| WatchError::Trigger {
            trigger: self.identity.id(),
            message: format!("template rendering failed: {}", e),
        })
    }

    pub fn simple_title(&self, container: &Container) -> Result<String> {
        self.rendered(self.templates.simple_title(container))
    }

    /// Simple body, followed by the link on its own line when the template
    /// does not place it.
    pub fn simple_body(&self, container: &Container) -> Result<String> {
        let body = self.rendered(self.templates.simple_body(container))?;
        Ok(match container.link.as_deref() {
            Some(link) if !self.templates.body_has_link() => format!("{}\n{}", body, link),
            _ => body,
        })
    }

    pub fn batch_title(&self, containers: &[Container]) -> Result<String> {
        self.rendered(self.templates.batch_title(containers))
    }

    /// One `- <simple body>` line per container.
    pub fn batch_body(&self, containers: &[Container]) -> Result<String> {
        let lines = containers
            .iter()
            .map(|c| self.simple_body(c).map(|body| format!("- {}", body)))
            .collect::<Result<Vec<_>>>()?;
        Ok(lines.join("\n"))
    }

    /// Send a request and map non-2xx answers to a trigger error.
    pub async fn send(&self, options: RequestOptions) -> Result<()> {
        let url = options.url.clone();
        let response = self.http.request(options).await?;
        if !response.is_success() {
            return Err(WatchError::Trigger {
                trigger: self.identity.id(),
                message: format!("{} returned HTTP {}", url, response.status),
            });
        }
        Ok(())
    }
}

/// Component wrapping a delivery provider with its event loop.
pub struct TriggerDispatcher {
    trigger: Arc<dyn Trigger>,
    events: EventEmitter,
    metrics: EngineMetrics,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerDispatcher {
    pub fn new(trigger: Arc<dyn Trigger>, events: EventEmitter, metrics: EngineMetrics) -> Self {
        Self {
            trigger,
            events,
            metrics,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn trigger(&self) -> &Arc<dyn Trigger> {
        &self.trigger
    }

    pub fn settings(&self) -> &TriggerSettings {
        &self.trigger.base().settings
    }

    pub fn mask_configuration(&self) -> RawConfig {
        self.trigger.mask_configuration()
    }
}

#[async_trait]
impl Component for TriggerDispatcher {
    fn identity(&self) -> &ComponentIdentity {
        &self.trigger.base().identity
    }

    async fn init(&self) -> Result<()> {
        // Subscribe before returning so no report emitted after registration is missed
        let mut events = self.events.subscribe();
        let mut state = DispatchState::new(Arc::clone(&self.trigger), self.metrics.clone());
        let cancel = self.cancel.clone();
        let id = self.id();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => state.handle(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => state.lagged(skipped),
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            if !state.pending.is_empty() {
                tracing::debug!(trigger = %id, pending = state.pending.len(), "Dropping unflushed batch");
            }
        });
        *self.task.lock() = Some(handle);
        tracing::info!(trigger = %self.id(), mode = ?self.settings().mode, "Trigger listening");
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(trigger = %self.id(), error = %e, "Trigger task ended abnormally");
            }
        }
        Ok(())
    }
}

/// Event loop state of one dispatcher.
struct DispatchState {
    trigger: Arc<dyn Trigger>,
    metrics: EngineMetrics,
    id: String,
    pending: Vec<Container>,
    cycles_since_flush: usize,
}

impl DispatchState {
    fn new(trigger: Arc<dyn Trigger>, metrics: EngineMetrics) -> Self {
        let id = trigger.base().identity.id();
        Self {
            trigger,
            metrics,
            id,
            pending: Vec::new(),
            cycles_since_flush: 0,
        }
    }

    fn settings(&self) -> &TriggerSettings {
        &self.trigger.base().settings
    }

    async fn handle(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::ContainerReport(report) => {
                if !self.settings().should_notify(&report) {
                    return;
                }
                let mode = self.settings().mode;
                match mode {
                    Mode::Simple => {
                        let outcome = self.trigger.trigger(&report.container).await;
                        self.record(outcome, 1);
                    }
                    Mode::Batch => {
                        let container = report.container;
                        self.pending.retain(|c| c.full_name() != container.full_name());
                        self.pending.push(container);
                    }
                }
            }
            WatchEvent::CycleCompleted { .. } if self.settings().mode == Mode::Batch => {
                self.cycles_since_flush += 1;
                if self.cycles_since_flush >= self.settings().batch_flush {
                    self.cycles_since_flush = 0;
                    self.flush().await;
                }
            }
            WatchEvent::CycleCompleted { .. } => {}
        }
    }

    /// Reports lost because the event channel overflowed before this
    /// trigger read them.
    fn lagged(&self, skipped: u64) {
        tracing::warn!(trigger = %self.id, skipped, "Trigger lagging, reports dropped");
        self.metrics.events_lagged(&self.id, skipped);
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let outcome = self.trigger.trigger_batch(&batch).await;
        self.record(outcome, batch.len());
    }

    fn record(&self, outcome: Result<()>, containers: usize) {
        match outcome {
            Ok(()) => {
                tracing::info!(trigger = %self.id, containers, "Notification sent");
                self.metrics.delivery(&self.id, true);
            }
            Err(e) => {
                tracing::warn!(trigger = %self.id, containers, error = %e, "Notification failed");
                self.metrics.delivery(&self.id, false);
            }
        }
    }
}
