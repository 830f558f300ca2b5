use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tracing::info;

use fedimap_core::client::{AllowList, ClientSettings, MastodonClient, StaticAllowList};
use fedimap_core::crawl::{Crawler, PassOptions};
use fedimap_core::progress::IndicatifReporter;
use fedimap_core::store::SqliteStore;
use fedimap_core::types::FailureKind;

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Crawl every known instance, not only stale ones
    #[arg(long)]
    pub all: bool,

    /// Do not cap the number of instances seeded into the pass
    #[arg(long)]
    pub unlimited: bool,

    /// Number of parallel workers (overrides crawl.workers)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Database path (overrides store.path)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Config file (default: ./fedimap.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: CrawlArgs, quiet: bool) -> anyhow::Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.crawl.workers = workers;
        config
            .validate()
            .context("Invalid config: --workers must be at least 1")?;
    }

    let allowlist: Arc<dyn AllowList> = match &config.crawl.allowlist_path {
        Some(path) => Arc::new(
            StaticAllowList::from_file(path)
                .with_context(|| format!("Cannot load config allow-list: {}", path.display()))?,
        ),
        None => Arc::new(StaticAllowList::empty()),
    };

    let client = MastodonClient::new(ClientSettings::from_config(&config.crawl), allowlist)
        .context("Cannot build HTTP client")?;

    let db_path = super::resolve_db_path(&config, args.db);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;
    info!(db = %db_path.display(), workers = config.crawl.workers, "starting crawl");

    let crawler = Crawler::new(Arc::new(client), Arc::new(store), config.crawl)
        .with_progress(Arc::new(progress_reporter(quiet)));
    let summary = crawler
        .run(PassOptions {
            all: args.all,
            unlimited: args.unlimited,
        })
        .await
        .context("Crawl pass failed")?;

    println!("Crawl pass {} finished", summary.run_id);
    println!();
    println!("  Seeded:             {}", summary.seeded);
    println!("  Processed:          {}", summary.processed);
    println!("  Succeeded:          {}", summary.succeeded);
    println!("  Failed:             {}", summary.failed());
    for kind in FailureKind::ALL {
        let count = summary.failures.get(&kind).copied().unwrap_or(0);
        if count > 0 {
            println!("    {:<18} {count:>6}", kind.as_str());
        }
    }
    println!("  Discovered:         {}", summary.discovered);
    println!("  Duplicates skipped: {}", summary.duplicates_skipped);
    println!("  Duration:           {:.2?}", summary.elapsed);

    if summary.commit_errors > 0 {
        println!();
        println!(
            "  Warnings: {} crawl result(s) could not be committed to the database",
            summary.commit_errors
        );
    }

    Ok(())
}

/// Spinner for interactive runs; `-q` keeps the counts but draws nothing.
fn progress_reporter(quiet: bool) -> IndicatifReporter {
    if quiet {
        IndicatifReporter::hidden()
    } else {
        IndicatifReporter::new()
    }
}
