use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use fedimap_core::graph;

#[derive(Args, Debug)]
pub struct EdgesArgs {
    /// Database path (overrides store.path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Config file (default: ./fedimap.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: EdgesArgs) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let db_path = super::resolve_db_path(&config, args.db);
    let store = super::open_existing_store(&db_path)?;

    let written = graph::rebuild_edges(&store)
        .await
        .context("Failed to rebuild edges in database")?;

    println!("Rebuilt {written} interaction edge(s) in {}", db_path.display());
    Ok(())
}
