//! Webhook trigger: POSTs the container (or the container list) as JSON.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shipwatch_core::component::{ConfigSchema, FieldSpec, FieldType};
use shipwatch_core::error::Result;
use shipwatch_core::model::Container;

use super::{Trigger, TriggerBase};
use crate::http::RequestOptions;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Webhook {
    base: TriggerBase,
}

impl Webhook {
    pub fn new(base: TriggerBase) -> Self {
        Self { base }
    }

    /// `headers` is an optional map of extra request headers.
    pub fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .field(FieldSpec::new("url", FieldType::Url).required())
            .field(FieldSpec::string("token").secret())
            .field(FieldSpec::string("login"))
            .field(FieldSpec::string("password").secret())
            .together(&["login", "password"])
    }

    fn request(&self, body: &Value) -> Result<RequestOptions> {
        let config = &self.base.config;
        let mut options = RequestOptions::post_json(config.get_str("url").unwrap_or_default(), body)?
            .with_timeout(DELIVERY_TIMEOUT);

        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                match value {
                    Value::String(s) => options.set_header(name, s.as_str()),
                    other => options.set_header(name, other.to_string()),
                }
            }
        }
        if let (Some(login), Some(password)) = (config.get_str("login"), config.get_str("password")) {
            options.basic_auth(login, password);
        } else if let Some(token) = config.get_str("token") {
            options.bearer_auth(token);
        }
        Ok(options)
    }
}

#[async_trait]
impl Trigger for Webhook {
    fn base(&self) -> &TriggerBase {
        &self.base
    }

    async fn trigger(&self, container: &Container) -> Result<()> {
        let body = serde_json::to_value(container)?;
        self.base.send(self.request(&body)?).await
    }

    async fn trigger_batch(&self, containers: &[Container]) -> Result<()> {
        let body = serde_json::to_value(containers)?;
        self.base.send(self.request(&body)?).await
    }
}
