//! Shipwatch CLI entry point.

use clap::Parser;

use shipwatch_cli::commands::{dispatch, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
