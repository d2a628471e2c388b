//! `shipwatch tags` command.

use clap::Args;
use shipwatch_core::EngineConfig;
use shipwatch_runtime::WatchEngine;

use crate::output::new_table;

#[derive(Args)]
pub struct TagsArgs {
    /// Image reference, e.g. `nginx:1.25` or `ghcr.io/owner/app:v2.0.0`
    pub image: String,

    /// Show at most this many candidates
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: usize,
}

pub async fn execute(args: TagsArgs, config: EngineConfig) -> anyhow::Result<()> {
    let engine = WatchEngine::new(config.engine.clone())?;
    for settings in config.registry_settings() {
        if let Err(e) = engine.register_registry(&settings).await {
            tracing::warn!(registry = %settings.name, error = %e, "Registry not registered");
        }
    }
    engine.register_default_registries().await?;

    let outcome = engine.resolve_reference(&args.image).await;
    engine.shutdown().await;
    let (image, resolution) = outcome?;

    println!("Image:    {}", args.image);
    println!("Registry: {} ({})", image.registry.name, image.registry.url);
    if resolution.result.tag != image.tag.value {
        println!("Update:   {}", resolution.result.tag);
    } else if image.tag.semver {
        println!("Update:   none (up to date)");
    } else {
        println!("Update:   none (tag is not semver)");
    }

    if resolution.candidates.is_empty() {
        println!("\nNo newer candidate tags.");
        return Ok(());
    }

    let mut table = new_table(&["CANDIDATE", ""]);
    for tag in resolution.candidates.iter().take(args.limit) {
        let marker = if *tag == resolution.result.tag { "selected" } else { "" };
        table.add_row([tag.as_str(), marker]);
    }
    println!();
    println!("{table}");
    Ok(())
}
