//! `shipwatch check` command.

use clap::Args;
use shipwatch_core::{ComponentIdentity, ComponentSettings, ConfigSchema, EngineConfig, Kind, RawConfig, Result};
use shipwatch_runtime::{registry, trigger, watcher};

use crate::output::{format_config, new_table};

#[derive(Args)]
pub struct CheckArgs;

/// Validation outcome of one configured component.
#[derive(Debug)]
pub struct CheckRow {
    pub id: String,
    pub outcome: std::result::Result<String, String>,
}

pub async fn execute(_args: CheckArgs, config: EngineConfig) -> anyhow::Result<()> {
    let rows = check_config(&config);

    let mut table = new_table(&["COMPONENT", "STATUS", "CONFIGURATION"]);
    for row in &rows {
        match &row.outcome {
            Ok(masked) => table.add_row([row.id.as_str(), "ok", masked.as_str()]),
            Err(message) => table.add_row([row.id.as_str(), "invalid", message.as_str()]),
        };
    }
    println!("{table}");

    if config.engine.default_registries {
        println!("\nAnonymous hub, ghcr, quay and ecr registries are added when not configured.");
    }

    let invalid = rows.iter().filter(|row| row.outcome.is_err()).count();
    if invalid > 0 {
        anyhow::bail!("{invalid} component(s) have an invalid configuration");
    }
    Ok(())
}

/// Validate every component without registering it.
pub fn check_config(config: &EngineConfig) -> Vec<CheckRow> {
    let sections = [
        (Kind::Registry, config.registry_settings()),
        (Kind::Trigger, config.trigger_settings()),
        (Kind::Watcher, config.watcher_settings()),
    ];

    sections
        .into_iter()
        .flat_map(|(kind, entries)| entries.into_iter().map(move |settings| check_one(kind, &settings)))
        .collect()
}

fn check_one(kind: Kind, settings: &ComponentSettings) -> CheckRow {
    let identity = ComponentIdentity::new(kind, &settings.type_name, &settings.name);
    let outcome = schema_for(&identity, &settings.config)
        .map_err(|e| e.to_string())
        .and_then(|schema| {
            schema
                .validate(&settings.config)
                .map(|validated| format_config(&validated.masked()))
                .map_err(|e| e.to_string())
        });
    CheckRow {
        id: identity.id(),
        outcome,
    }
}

fn schema_for(identity: &ComponentIdentity, config: &RawConfig) -> Result<ConfigSchema> {
    match identity.kind {
        Kind::Registry => registry::schema(&identity.type_name, config),
        Kind::Trigger => trigger::schema(&identity.type_name),
        Kind::Watcher => watcher::schema(&identity.type_name),
    }
}
