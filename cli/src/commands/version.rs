//! `shipwatch version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> anyhow::Result<()> {
    println!("shipwatch version {}", shipwatch_runtime::VERSION);
    Ok(())
}
