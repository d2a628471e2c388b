use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::component::RawConfig;
use crate::error::{Result, WatchError};

/// Engine configuration, as loaded from a YAML document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level
    pub log_level: LogLevel,

    /// Engine-wide settings
    pub engine: EngineSettings,

    /// Watchers, keyed by instance name
    pub watchers: BTreeMap<String, ComponentEntry>,

    /// Registries, keyed by instance name
    pub registries: BTreeMap<String, ComponentEntry>,

    /// Triggers, keyed by instance name
    pub triggers: BTreeMap<String, ComponentEntry>,
}

impl EngineConfig {
    /// Parse and sanity-check a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn watcher_settings(&self) -> Vec<ComponentSettings> {
        Self::settings(&self.watchers)
    }

    pub fn registry_settings(&self) -> Vec<ComponentSettings> {
        Self::settings(&self.registries)
    }

    pub fn trigger_settings(&self) -> Vec<ComponentSettings> {
        Self::settings(&self.triggers)
    }

    fn settings(entries: &BTreeMap<String, ComponentEntry>) -> Vec<ComponentSettings> {
        entries
            .iter()
            .map(|(name, entry)| ComponentSettings {
                type_name: entry.type_name.clone().unwrap_or_else(|| name.clone()),
                name: name.clone(),
                config: entry.fields.clone(),
            })
            .collect()
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Containers resolved in parallel per watcher cycle
    pub concurrency: usize,

    /// Upper bound for resolving one container (seconds)
    pub resolve_timeout_secs: u64,

    /// Upper bound for one registry authentication exchange (seconds)
    pub auth_timeout_secs: u64,

    /// Directory for JSON snapshots (in-memory snapshots when unset)
    pub snapshot_dir: Option<PathBuf>,

    /// Register anonymous hub/ghcr/quay/ecr-public registries when not configured
    pub default_registries: bool,

    /// Events buffered per subscriber before the slowest one starts missing reports
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            resolve_timeout_secs: 60,
            auth_timeout_secs: 15,
            snapshot_dir: None,
            default_registries: true,
            event_capacity: 1024,
        }
    }
}

impl EngineSettings {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(WatchError::config("engine", "concurrency must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(WatchError::config("engine", "event_capacity must be at least 1"));
        }
        if self.resolve_timeout_secs == 0 || self.auth_timeout_secs == 0 {
            return Err(WatchError::config("engine", "timeouts must be at least 1 second"));
        }
        Ok(())
    }
}

/// One `name: { type, ...fields }` entry of a component section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentEntry {
    /// Provider type; defaults to the entry name
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// Remaining, type-specific fields
    #[serde(flatten)]
    pub fields: RawConfig,
}

/// Resolved settings for registering one component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSettings {
    pub type_name: String,
    pub name: String,
    pub config: RawConfig,
}

impl ComponentSettings {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>, config: RawConfig) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            config,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.engine.concurrency, 8);
        assert_eq!(config.engine.resolve_timeout(), Duration::from_secs(60));
        assert_eq!(config.engine.auth_timeout(), Duration::from_secs(15));
        assert!(config.engine.default_registries);
        assert_eq!(config.engine.event_capacity, 1024);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_parse_sections() {
        let yaml = r#"
log_level: debug
engine:
  concurrency: 4
watchers:
  local:
    type: docker
    host: 10.0.0.5
    cron: "*/5 * * * *"
registries:
  hub: {}
  private:
    type: ecr
    region: eu-west-1
triggers:
  ops:
    type: webhook
    url: https://hooks.example.com/x
    once: false
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.engine.concurrency, 4);
        assert_eq!(config.engine.resolve_timeout_secs, 60);

        let watchers = config.watcher_settings();
        assert_eq!(watchers.len(), 1);
        assert_eq!(watchers[0].type_name, "docker");
        assert_eq!(watchers[0].name, "local");
        assert_eq!(watchers[0].config["host"], "10.0.0.5");
        assert!(!watchers[0].config.contains_key("type"));

        let registries = config.registry_settings();
        assert_eq!(registries[0].type_name, "hub");
        assert_eq!(registries[1].type_name, "ecr");
        assert_eq!(registries[1].name, "private");

        let triggers = config.trigger_settings();
        assert_eq!(triggers[0].config["once"], false);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = EngineConfig::from_yaml_str("engine:\n  concurrency: 0\n").unwrap_err();
        assert!(matches!(err, WatchError::Configuration { .. }));
    }

    #[test]
    fn test_zero_event_capacity_rejected() {
        let err = EngineConfig::from_yaml_str("engine:\n  event_capacity: 0\n").unwrap_err();
        assert!(err.to_string().contains("event_capacity"));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = EngineConfig::from_yaml_str("watchers: [").unwrap_err();
        assert!(matches!(err, WatchError::Serialization(_)));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.as_str(), "trace");
    }
}
