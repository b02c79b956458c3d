//! `geostored`: run one geostore node until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use geostore::Node;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "geostored", about = "Replicated in-memory geospatial feature store")]
struct Args {
    /// Data directory holding geostore.toml, the log and the checkpoint
    #[arg(default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("geostore=info,warn")),
        )
        .init();

    let args = Args::parse();
    let node = Node::start(&args.data_dir)
        .await
        .with_context(|| format!("starting node in {}", args.data_dir.display()))?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("Interrupt received, shutting down");

    node.shutdown().await.context("shutting down node")?;
    Ok(())
}
