//! Shipwatch Core - Foundational Types and Abstractions
//!
//! This crate provides the component framework, data model, event bus,
//! configuration types and error taxonomy shared by the Shipwatch runtime
//! and CLI.

pub mod component;
pub mod config;
pub mod error;
pub mod event;
pub mod model;

// Re-export commonly used types
pub use component::{
    mask, mask_secret, Component, ComponentConfig, ComponentIdentity, ComponentRegistry,
    ConfigSchema, FieldSpec, FieldType, Kind, RawConfig, ValidationError,
};
pub use config::{ComponentSettings, EngineConfig, EngineSettings, LogLevel};
pub use error::{ErrorKind, Result, WatchError};
pub use event::{EventEmitter, EventStream, WatchEvent};
pub use model::{
    AuthScheme, Container, ContainerError, ContainerReport, CycleStats, DigestInfo, Image,
    RegistryDescriptor, RegistryRef, SemverDiff, TagInfo, UpdateKind, UpdateResult,
};

/// Shipwatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
