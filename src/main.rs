use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hubd::config::{normalize_addr, Settings};
use hubd::{AppState, HubServer, Importer};

#[derive(Parser)]
#[command(name = "hubd")]
#[command(about = "Self-hosted git server with LFS and a model-hub compatible API", long_about = None)]
struct Cli {
    /// HTTP server address
    #[arg(long, default_value = ":8080")]
    addr: String,

    /// Directory containing git repositories
    #[arg(long = "repo", default_value = "./data")]
    repo: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.repo)
        .with_context(|| format!("failed to create repo directory {}", cli.repo.display()))?;
    let settings = Settings {
        addr: normalize_addr(&cli.addr),
        root: std::fs::canonicalize(&cli.repo)
            .with_context(|| format!("failed to resolve repo directory {}", cli.repo.display()))?,
    };

    let state = AppState::new(&settings.root)?;

    // Background consumer for import/sync tasks.
    let queue = state
        .queue
        .clone()
        .context("task queue was not initialized")?;
    let importer = Importer::new(
        settings.root.clone(),
        queue,
        state.content.clone(),
        state.write_locks.clone(),
    );
    importer.spawn();

    info!(addr = %settings.addr, root = %settings.root.display(), "starting hubd");
    HubServer::new(state, settings.addr).run().await
}
