//! webswarm - self-cloning web automation agents
//!
//! Main entry point for the CLI application.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use webswarm::cli::{self, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webswarm=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    cli::run(args).await
}
