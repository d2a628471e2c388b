//! Explicit component registry owned by the process root.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Component, ComponentConfig, ComponentIdentity, ConfigSchema, Kind, RawConfig};
use crate::error::{Result, WatchError};

/// Registered components of one [`Kind`], keyed by `kind.type.name`.
pub struct ComponentRegistry<C: ?Sized> {
    kind: Kind,
    components: RwLock<BTreeMap<String, Arc<C>>>,
}

impl<C: Component + ?Sized> ComponentRegistry<C> {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            components: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Validate, build and initialize a component, then store it.
    ///
    /// An instance already registered under the same id is deregistered and
    /// removed first. When validation, construction or `init()` fails nothing
    /// is stored for the id.
    pub async fn register<F>(
        &self,
        identity: ComponentIdentity,
        raw: &RawConfig,
        schema: &ConfigSchema,
        build: F,
    ) -> Result<Arc<C>>
    where
        F: FnOnce(ComponentIdentity, ComponentConfig) -> Result<Arc<C>>,
    {
        let id = identity.id();
        if identity.kind != self.kind {
            return Err(WatchError::config(
                &id,
                format!("expected a {} component", self.kind),
            ));
        }

        let config = schema.validate(raw).map_err(|e| {
            tracing::warn!(component = %id, error = %e, "Configuration rejected");
            WatchError::config(&id, e.to_string())
        })?;

        let prior = self.components.write().remove(&id);
        if let Some(prior) = prior {
            tracing::info!(component = %id, "Replacing registered component");
            if let Err(e) = prior.deregister().await {
                tracing::warn!(component = %id, error = %e, "Failed to deregister replaced component");
            }
        }

        let component = build(identity, config)?;
        if let Err(e) = component.init().await {
            tracing::warn!(component = %id, error = %e, "Component initialization failed");
            let _ = component.deregister().await;
            return Err(e);
        }

        self.components.write().insert(id.clone(), Arc::clone(&component));
        tracing::info!(component = %id, "Component registered");
        Ok(component)
    }

    /// Deregister and remove a component.
    pub async fn deregister(&self, id: &str) -> Result<()> {
        let component = self
            .components
            .write()
            .remove(id)
            .ok_or_else(|| WatchError::ComponentNotFound(id.to_string()))?;
        component.deregister().await?;
        tracing::info!(component = %id, "Component deregistered");
        Ok(())
    }

    /// Deregister every component, logging (not propagating) failures.
    pub async fn deregister_all(&self) {
        let drained: Vec<(String, Arc<C>)> = {
            let mut components = self.components.write();
            std::mem::take(&mut *components).into_iter().collect()
        };
        for (id, component) in drained {
            if let Err(e) = component.deregister().await {
                tracing::warn!(component = %id, error = %e, "Failed to deregister component");
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<C>> {
        self.components.read().get(id).cloned()
    }

    /// All components, ordered by id.
    pub fn list(&self) -> Vec<Arc<C>> {
        self.components.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.components.read().keys().cloned().collect()
    }

    /// First component (by id order) accepted by `predicate`.
    pub fn find(&self, predicate: impl Fn(&C) -> bool) -> Option<Arc<C>> {
        self.components
            .read()
            .values()
            .find(|c| predicate(c.as_ref()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }
}
