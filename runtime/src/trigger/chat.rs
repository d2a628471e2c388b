//! Chat trigger: POSTs a `{ "title", "text" }` card to an incoming-webhook URL.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use shipwatch_core::component::{ConfigSchema, FieldSpec, FieldType};
use shipwatch_core::error::Result;
use shipwatch_core::model::Container;

use super::{Trigger, TriggerBase};
use crate::http::RequestOptions;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Chat {
    base: TriggerBase,
}

impl Chat {
    pub fn new(base: TriggerBase) -> Self {
        Self { base }
    }

    /// Incoming-webhook URLs carry their own credential, so `url` is secret.
    pub fn schema() -> ConfigSchema {
        ConfigSchema::new().field(FieldSpec::new("url", FieldType::Url).required().secret())
    }

    async fn post(&self, title: String, text: String) -> Result<()> {
        let url = self.base.config.get_str("url").unwrap_or_default();
        let options = RequestOptions::post_json(url, &json!({ "title": title, "text": text }))?
            .with_timeout(DELIVERY_TIMEOUT);
        self.base.send(options).await
    }
}

#[async_trait]
impl Trigger for Chat {
    fn base(&self) -> &TriggerBase {
        &self.base
    }

    async fn trigger(&self, container: &Container) -> Result<()> {
        self.post(self.base.simple_title(container)?, self.base.simple_body(container)?)
            .await
    }

    async fn trigger_batch(&self, containers: &[Container]) -> Result<()> {
        self.post(self.base.batch_title(containers)?, self.base.batch_body(containers)?)
            .await
    }
}
