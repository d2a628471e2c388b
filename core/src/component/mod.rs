//! Component framework shared by watchers, registries and triggers.
//!
//! Every pluggable unit goes through the same lifecycle:
//!
//! ```text
//! raw config ──► validate (schema) ──► build ──► init() ──► active ──► deregister()
//!                     │                            │
//!                     └── ValidationError          └── init error: nothing retained
//! ```
//!
//! Validation and initialization are separate phases: a bad configuration
//! never reaches `init()`.

mod registry;
mod schema;

pub use registry::ComponentRegistry;
pub use schema::{
    normalize_cron, ComponentConfig, ConfigSchema, FieldSpec, FieldType, RawConfig, ValidationError,
    ValidationReason,
};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default number of characters revealed at each end of a masked secret.
pub const DEFAULT_MASK_REVEAL: usize = 1;

/// Default character substituted for hidden secret characters.
pub const DEFAULT_MASK_CHAR: char = '*';

/// Category of a pluggable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Watcher,
    Registry,
    Trigger,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Watcher => "watcher",
            Kind::Registry => "registry",
            Kind::Trigger => "trigger",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(kind, type, name)` triple identifying one component instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentIdentity {
    pub kind: Kind,
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
}

impl ComponentIdentity {
    pub fn new(kind: Kind, type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: type_name.into().to_lowercase(),
            name: name.into().to_lowercase(),
        }
    }

    /// Unique id: `kind.type.name`.
    pub fn id(&self) -> String {
        format!("{}.{}.{}", self.kind, self.type_name, self.name)
    }

    /// `type.name`, used to tag images with the registry that owns them.
    pub fn short_id(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.kind, self.type_name, self.name)
    }
}

/// Lifecycle shared by every component kind.
#[async_trait]
pub trait Component: Send + Sync {
    /// Identity assigned at registration.
    fn identity(&self) -> &ComponentIdentity;

    /// `kind.type.name`
    fn id(&self) -> String {
        self.identity().id()
    }

    /// Second registration phase, only reached with a validated configuration.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Release schedules, tasks and connections held by the component.
    async fn deregister(&self) -> Result<()> {
        Ok(())
    }
}

/// Mask a secret, keeping `reveal` characters visible at each end.
///
/// Values of length `<= 2 * reveal` are masked entirely. `None` stays `None`.
pub fn mask(value: Option<&str>, reveal: usize, mask_char: char) -> Option<String> {
    let value = value?;
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= reveal.saturating_mul(2) {
        return Some(std::iter::repeat(mask_char).take(len).collect());
    }

    let mut masked = String::with_capacity(value.len());
    masked.extend(&chars[..reveal]);
    masked.extend(std::iter::repeat(mask_char).take(len - 2 * reveal));
    masked.extend(&chars[len - reveal..]);
    Some(masked)
}

/// [`mask`] with the default reveal count and mask character.
pub fn mask_secret(value: &str) -> String {
    mask(Some(value), DEFAULT_MASK_REVEAL, DEFAULT_MASK_CHAR).unwrap_or_default()
}
