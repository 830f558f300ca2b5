use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use fedimap_core::store::CrawlStore;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Database path (overrides store.path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Config file (default: ./fedimap.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let db_path = super::resolve_db_path(&config, args.db);
    let store = super::open_existing_store(&db_path)?;

    let stats = store.stats().await.context("Failed to read store stats")?;

    println!("fedimap status");
    println!();
    println!("  Database: {}", db_path.display());
    if stats.db_size_bytes > 0 {
        println!("  Size:     {}", format_bytes(stats.db_size_bytes));
    }
    println!();

    println!("  Instances: {} total", stats.total_instances);
    let mut statuses: Vec<_> = stats.instances_by_status.iter().collect();
    statuses.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (status, count) in &statuses {
        println!("    {status:<20} {count:>6}");
    }
    println!("    {:<20} {:>6}", "never crawled", stats.never_crawled);
    println!();

    println!("  Peer relationships: {}", stats.total_relationships);
    println!("    with mentions:    {}", stats.relationships_with_mentions);
    println!("  Edges:              {}", stats.total_edges);

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
