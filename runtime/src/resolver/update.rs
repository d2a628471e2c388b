//! Derived update properties of a resolved container.

use chrono::DateTime;
use handlebars::RenderError;
use serde::Serialize;
use shipwatch_core::model::{Container, SemverDiff, UpdateKind};

use super::tag::{parse_semver, semver_diff, transform_tag};
use crate::template::render_template;

/// Whether the resolved result differs from what the container runs.
///
/// Digests decide when digest watching produced both values. Otherwise the
/// transformed tags are compared, and a differing image creation date also
/// counts as an update (legacy schema-1 images only change there).
pub fn is_update_available(container: &Container) -> bool {
    let Some(result) = container.result.as_ref() else {
        return false;
    };
    let image = &container.image;
    if image.digest.watch {
        if let (Some(local), Some(remote)) = (image.digest.value.as_ref(), result.digest.as_ref()) {
            return local != remote;
        }
    }

    let transform = container.transform_tags.as_deref();
    let mut available = transform_tag(transform, &image.tag.value) != transform_tag(transform, &result.tag);
    if let (Some(local), Some(remote)) = (image.created.as_deref(), result.created.as_deref()) {
        available = available || !same_instant(local, remote);
    }
    available
}

/// RFC 3339 timestamps compared as instants, anything else as text.
fn same_instant(a: &str, b: &str) -> bool {
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Classify an available update.
pub fn update_kind(container: &Container) -> UpdateKind {
    let Some(result) = container.result.as_ref() else {
        return UpdateKind::Unknown;
    };
    if !container.update_available {
        return UpdateKind::Unknown;
    }

    let image = &container.image;
    if image.tag.value != result.tag {
        let semver_diff = if image.tag.semver {
            let transform = container.transform_tags.as_deref();
            semver_diff(
                &transform_tag(transform, &image.tag.value),
                &transform_tag(transform, &result.tag),
            )
        } else {
            SemverDiff::Unknown
        };
        return UpdateKind::Tag {
            local_value: image.tag.value.clone(),
            remote_value: result.tag.clone(),
            semver_diff,
        };
    }

    UpdateKind::Digest {
        local_value: image.digest.value.clone(),
        remote_value: result.digest.clone(),
    }
}

#[derive(Debug, Default, Serialize)]
struct LinkContext<'a> {
    raw: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    major: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minor: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    patch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prerelease: Option<String>,
}

/// Render a link template against `{{raw}}` and, for semver tags,
/// `{{major}}`, `{{minor}}`, `{{patch}}` and `{{prerelease}}` (first
/// pre-release identifier). Keys without a value render empty.
pub fn render_link(template: &str, tag: &str, semver: bool) -> Result<String, RenderError> {
    let mut context = LinkContext {
        raw: tag,
        ..Default::default()
    };
    if let Some(version) = semver.then(|| parse_semver(tag)).flatten() {
        context.major = Some(version.major);
        context.minor = Some(version.minor);
        context.patch = Some(version.patch);
        context.prerelease = version
            .pre
            .as_str()
            .split('.')
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }
    render_template(template, &context)
}

/// Link for the version the container would move to, or the current one.
/// A template that fails to render yields no link.
pub fn container_link(container: &Container) -> Option<String> {
    let template = container.link_template.as_deref()?;
    let tag = match container.result.as_ref() {
        Some(result) if container.update_available => &result.tag,
        _ => &container.image.tag.value,
    };
    let transformed = transform_tag(container.transform_tags.as_deref(), tag);
    match render_link(template, &transformed, container.image.tag.semver) {
        Ok(link) => Some(link),
        Err(e) => {
            tracing::warn!(container = %container.name, error = %e, "Invalid link template");
            None
        }
    }
}

/// Recompute `update_available`, `update_kind` and `link` in place.
pub fn refresh_derived(container: &mut Container) {
    container.update_available = is_update_available(container);
    container.update_kind = update_kind(container);
    container.link = container_link(container);
}
