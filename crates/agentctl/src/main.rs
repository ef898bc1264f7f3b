mod builtins;
mod cli;
mod plan_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use engine_config::Configuration;
use engine_planner::{FileBackedStore, Planner};
use engine_snapshot::{SnapshotManager, SnapshotStore};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let working_directory = std::env::current_dir()?;
    let state_dir = state_directory(&working_directory);

    let config = Configuration::load(&state_dir.join("config.toml")).unwrap_or_default();
    let registry = builtins::registry_for(&working_directory);
    let store = Box::new(FileBackedStore::new(state_dir.join("plans")));
    let snapshot_store = SnapshotStore::new(state_dir.join("snapshots"))?;
    let snapshots = SnapshotManager::new(snapshot_store, &working_directory);

    let planner = Planner::new(config, registry, store, snapshots, &working_directory);

    match cli.command {
        Commands::Plan { cmd } => plan_cmd::run(&planner, cmd, cli.format).await?,
    }

    Ok(())
}

fn state_directory(working_directory: &std::path::Path) -> PathBuf {
    working_directory.join(".agentctl")
}
