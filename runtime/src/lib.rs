//! Shipwatch Runtime - container image watch engine.
//!
//! This crate provides the registry providers, tag resolution, container
//! watchers, trigger dispatch and metrics behind the [`WatchEngine`] root
//! object.

#![allow(clippy::result_large_err)]

pub mod engine;
pub mod http;
pub mod metrics;
pub mod oci;
pub mod registry;
pub mod resolver;
pub mod template;
pub mod testing;
pub mod trigger;
pub mod watcher;

// Re-export common types
pub use engine::{RegistrationSummary, WatchEngine};
pub use http::{HttpClient, HttpResponse, Method, ReqwestClient, RequestOptions};
pub use metrics::EngineMetrics;
pub use oci::ImageReference;
pub use registry::{ManifestDigest, PullCredentials, RegistryClient, RegistryProvider};
pub use resolver::{ImageResolver, Resolution};
pub use trigger::{Trigger, TriggerDispatcher, TriggerSettings};
pub use watcher::{ContainerSource, CycleDiff, DockerWatcher, SnapshotStore, Watcher};

/// Shipwatch Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
