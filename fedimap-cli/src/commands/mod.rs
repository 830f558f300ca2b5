pub mod crawl;
pub mod edges;
pub mod init;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use fedimap_core::config::FedimapConfig;
use fedimap_core::store::SqliteStore;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "fedimap.toml";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default fedimap.toml
    Init(init::InitArgs),
    /// Run one crawl pass over stale (or all) instances
    Crawl(crawl::CrawlArgs),
    /// Show instance, relationship and edge counts
    Status(status::StatusArgs),
    /// Rebuild the symmetric interaction edges from crawled relationships
    Edges(edges::EdgesArgs),
}

pub async fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args).await,
        Command::Crawl(args) => crawl::run(args, quiet).await,
        Command::Status(args) => status::run(args).await,
        Command::Edges(args) => edges::run(args).await,
    }
}

/// Load the config named on the command line, or `fedimap.toml` if present.
///
/// An explicitly named file must exist; the default one may be absent.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<FedimapConfig> {
    match path {
        Some(path) => FedimapConfig::load(path)
            .with_context(|| format!("Cannot load config: {}", path.display())),
        None => FedimapConfig::load_or_default(Path::new(DEFAULT_CONFIG_PATH))
            .with_context(|| format!("Cannot load config: {DEFAULT_CONFIG_PATH}")),
    }
}

/// `--db` wins over `[store] path`.
pub fn resolve_db_path(config: &FedimapConfig, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| config.store.path.clone())
}

/// Open an existing database; commands that only read never create one.
pub fn open_existing_store(db_path: &Path) -> anyhow::Result<SqliteStore> {
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {}. Run `fedimap crawl` first.",
            db_path.display()
        );
    }
    SqliteStore::open(db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))
}
