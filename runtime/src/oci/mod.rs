//! Image references and registry v2 payload types.

pub mod manifest;
pub mod reference;

pub use manifest::{ManifestDocument, Platform, PlatformManifest, TagList};
pub use reference::ImageReference;
