//! Per-container watch settings from container labels.
//!
//! Labels follow the `shipwatch.*` namespace.
//!
//! - `shipwatch.watch` - `true`/`false`, overrides the watcher's `watchbydefault`
//! - `shipwatch.watch.digest` - `true`/`false`, overrides digest watching
//!   (on by default for non-semver tags only)
//! - `shipwatch.tag.include` - regex a candidate tag must match
//! - `shipwatch.tag.exclude` - regex a candidate tag must not match
//! - `shipwatch.tag.transform` - `<regex> => <replacement>` applied before comparing
//! - `shipwatch.link.template` - handlebars link template over `{{raw}}`, `{{major}}`, ...
//! - `shipwatch.display.name` - friendly name used in notifications
//!
//! ```text
//! docker run -l shipwatch.tag.include='^\d+\.\d+\.\d+$' -l shipwatch.watch.digest=false nginx:1.25.3
//! ```

use std::collections::HashMap;

pub const WATCH: &str = "shipwatch.watch";
pub const WATCH_DIGEST: &str = "shipwatch.watch.digest";
pub const TAG_INCLUDE: &str = "shipwatch.tag.include";
pub const TAG_EXCLUDE: &str = "shipwatch.tag.exclude";
pub const TAG_TRANSFORM: &str = "shipwatch.tag.transform";
pub const LINK_TEMPLATE: &str = "shipwatch.link.template";
pub const DISPLAY_NAME: &str = "shipwatch.display.name";

/// Watch settings parsed from a container's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchLabels {
    pub watch: Option<bool>,
    pub watch_digest: Option<bool>,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub transform_tags: Option<String>,
    pub link_template: Option<String>,
    pub display_name: Option<String>,
}

impl WatchLabels {
    pub fn from_labels(labels: &HashMap<String, String>) -> Self {
        let mut parsed = Self::default();

        for (key, value) in labels {
            let text = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            match key.as_str() {
                WATCH => parsed.watch = parse_flag(value),
                WATCH_DIGEST => parsed.watch_digest = parse_flag(value),
                TAG_INCLUDE => parsed.include_tags = text,
                TAG_EXCLUDE => parsed.exclude_tags = text,
                TAG_TRANSFORM => parsed.transform_tags = text,
                LINK_TEMPLATE => parsed.link_template = text,
                DISPLAY_NAME => parsed.display_name = text,
                _ => {}
            }
        }

        parsed
    }

    /// Whether the container is watched, given the watcher's default.
    pub fn is_watched(&self, watch_by_default: bool) -> bool {
        self.watch.unwrap_or(watch_by_default)
    }

    /// Whether digests are compared. Defaults to on for non-semver tags,
    /// where tag comparison alone cannot see a rebuilt image.
    pub fn is_digest_watched(&self, semver: bool) -> bool {
        self.watch_digest.unwrap_or(!semver)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
