//! Notification titles and bodies, rendered with handlebars.
//!
//! Single-container templates see:
//!
//! | Key | Value |
//! |-----|-------|
//! | `{{name}}` | display name, else container name |
//! | `{{id}}` | container id |
//! | `{{watcher}}` | watcher name |
//! | `{{kind}}` | `tag`, `digest` or `unknown` |
//! | `{{local}}` / `{{remote}}` | running / available tag or digest |
//! | `{{semver}}` | `major`, `minor`, `patch`, `prerelease` or `unknown` |
//! | `{{link}}` | release notes link, empty when none |
//! | `{{container.*}}` | the full container, e.g. `{{container.image.tag.value}}` |
//!
//! Batch templates see `{{count}}` and `{{containers}}`, a list of the
//! single-container contexts above.

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;
use shipwatch_core::model::{Container, SemverDiff};

use crate::template::new_registry;

pub const DEFAULT_SIMPLE_TITLE: &str = "New {{kind}} found for container {{name}}";
pub const DEFAULT_SIMPLE_BODY: &str =
    "Container {{name}} running with {{kind}} {{local}} can be updated to {{kind}} {{remote}}";
pub const DEFAULT_BATCH_TITLE: &str = "{{count}} updates available";

const SIMPLE_TITLE: &str = "simple_title";
const SIMPLE_BODY: &str = "simple_body";
const BATCH_TITLE: &str = "batch_title";

/// Render context of one container.
#[derive(Debug, Serialize)]
pub struct ContainerContext<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub watcher: &'a str,
    pub kind: &'a str,
    pub local: &'a str,
    pub remote: &'a str,
    pub semver: &'a str,
    pub link: &'a str,
    pub container: &'a Container,
}

impl<'a> ContainerContext<'a> {
    pub fn new(container: &'a Container) -> Self {
        let kind = &container.update_kind;
        Self {
            name: container.label(),
            id: &container.id,
            watcher: &container.watcher,
            kind: kind.as_str(),
            local: kind.local_value().unwrap_or_default(),
            remote: kind.remote_value().unwrap_or_default(),
            semver: kind.semver_diff().unwrap_or(SemverDiff::Unknown).as_str(),
            link: container.link.as_deref().unwrap_or_default(),
            container,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchContext<'a> {
    count: usize,
    containers: Vec<ContainerContext<'a>>,
}

/// A trigger's compiled templates.
pub struct Templates {
    handlebars: Handlebars<'static>,
    body_has_link: bool,
}

impl Templates {
    pub fn new(simple_title: &str, simple_body: &str, batch_title: &str) -> Result<Self, TemplateError> {
        let mut handlebars = new_registry();
        handlebars.register_template_string(SIMPLE_TITLE, simple_title)?;
        handlebars.register_template_string(SIMPLE_BODY, simple_body)?;
        handlebars.register_template_string(BATCH_TITLE, batch_title)?;
        Ok(Self {
            handlebars,
            body_has_link: mentions_link(simple_body),
        })
    }

    /// Whether the body template already places the link itself.
    pub fn body_has_link(&self) -> bool {
        self.body_has_link
    }

    pub fn simple_title(&self, container: &Container) -> Result<String, RenderError> {
        self.handlebars.render(SIMPLE_TITLE, &ContainerContext::new(container))
    }

    pub fn simple_body(&self, container: &Container) -> Result<String, RenderError> {
        self.handlebars.render(SIMPLE_BODY, &ContainerContext::new(container))
    }

    pub fn batch_title(&self, containers: &[Container]) -> Result<String, RenderError> {
        let context = BatchContext {
            count: containers.len(),
            containers: containers.iter().map(ContainerContext::new).collect(),
        };
        self.handlebars.render(BATCH_TITLE, &context)
    }
}

/// True when some `{{...}}` expression of `template` reads a link.
fn mentions_link(template: &str) -> bool {
    template
        .split("{{")
        .skip(1)
        .filter_map(|rest| rest.split("}}").next())
        .any(|expression| expression.contains("link"))
}
