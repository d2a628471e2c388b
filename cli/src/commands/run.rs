//! `shipwatch run` command.

use clap::Args;
use shipwatch_core::{ContainerReport, EngineConfig};
use shipwatch_runtime::WatchEngine;

#[derive(Args)]
pub struct RunArgs {
    /// Exit with an error when any component fails to register
    #[arg(long)]
    pub strict: bool,
}

pub async fn execute(args: RunArgs, config: EngineConfig) -> anyhow::Result<()> {
    let engine = WatchEngine::new(config.engine.clone())?;
    let summary = engine.register_all(&config).await;

    if args.strict && !summary.failed.is_empty() {
        engine.shutdown().await;
        anyhow::bail!("{} component(s) failed to register", summary.failed.len());
    }
    if engine.watchers().is_empty() {
        tracing::warn!("No watcher registered; nothing will be watched");
    }
    tracing::info!(
        registered = summary.registered.len(),
        failed = summary.failed.len(),
        "Shipwatch started"
    );

    let _reports = engine.on_container_report(log_report);

    tokio::signal::ctrl_c().await?;
    engine.shutdown().await;
    Ok(())
}

fn log_report(report: ContainerReport) {
    let container = &report.container;
    if report.removed {
        tracing::info!(container = %container.full_name(), "Container removed");
    } else if let Some(error) = &container.error {
        tracing::warn!(container = %container.full_name(), error = %error.message, "Container not resolved");
    } else if report.changed && container.update_available {
        tracing::info!(
            container = %container.full_name(),
            kind = container.update_kind.as_str(),
            local = container.update_kind.local_value().unwrap_or("-"),
            remote = container.update_kind.remote_value().unwrap_or("-"),
            "Update available"
        );
    }
}
