//! Handlebars setup shared by notification templates and release-note links.
//!
//! Output is plain text, so HTML escaping is off. Strict mode is off too:
//! a missing key renders as an empty string.

use std::sync::OnceLock;

use handlebars::{Handlebars, RenderError};
use serde::Serialize;

/// A fresh registry with the crate's rendering settings.
pub fn new_registry() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

/// Render a template that is not registered ahead of time.
pub fn render_template<T: Serialize>(template: &str, data: &T) -> Result<String, RenderError> {
    static SHARED: OnceLock<Handlebars<'static>> = OnceLock::new();
    SHARED.get_or_init(new_registry).render_template(template, data)
}
