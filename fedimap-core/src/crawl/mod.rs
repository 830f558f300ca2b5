//! Crawl pass orchestration: seeding, the worker pool, and the pass summary.
//!
//! A pass moves through seeding (stale instances, or the bootstrap seed
//! when the store is empty), draining (workers pull from the shared
//! [`Frontier`] until it reports drained) and reporting. Peers discovered
//! during the pass join the same frontier, so a pass runs until the
//! reachable network is saturated.

pub mod frontier;
pub mod gateway;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::aggregate;
use crate::client::InstanceSource;
use crate::config::CrawlSection;
use crate::error::CrawlError;
use crate::progress::{NoopReporter, ProgressReporter};
use crate::store::CrawlStore;
use crate::types::{CrawlOutcome, FailureKind, TargetSelection};

pub use frontier::{Frontier, InstanceSet, Ticket};
pub use gateway::PersistenceGateway;

/// Operator switches for one pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    /// Seed with every known instance, not only stale ones.
    pub all: bool,
    /// Drop the per-pass cap on seeded instances.
    pub unlimited: bool,
}

/// What one pass did.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub run_id: Uuid,
    pub seeded: u64,
    /// Instances fetched and committed (or attempted), duplicates excluded.
    pub processed: u64,
    pub succeeded: u64,
    pub failures: BTreeMap<FailureKind, u64>,
    /// Instances first discovered during this pass.
    pub discovered: u64,
    /// Dequeues of an instance already processed this pass.
    pub duplicates_skipped: u64,
    pub commit_errors: u64,
    pub elapsed: Duration,
}

impl CrawlSummary {
    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }
}

/// Per-worker counters, merged into the summary once the worker exits.
#[derive(Debug, Default)]
struct WorkerTally {
    processed: u64,
    succeeded: u64,
    failures: BTreeMap<FailureKind, u64>,
    discovered: u64,
    duplicates_skipped: u64,
    commit_errors: u64,
}

impl WorkerTally {
    fn merge_into(self, summary: &mut CrawlSummary) {
        summary.processed += self.processed;
        summary.succeeded += self.succeeded;
        for (kind, n) in self.failures {
            *summary.failures.entry(kind).or_insert(0) += n;
        }
        summary.discovered += self.discovered;
        summary.duplicates_skipped += self.duplicates_skipped;
        summary.commit_errors += self.commit_errors;
    }
}

/// Everything a worker task shares with its siblings.
struct PassContext {
    source: Arc<dyn InstanceSource>,
    gateway: PersistenceGateway,
    frontier: Frontier,
    /// Instances dequeued so far this pass.
    processed: InstanceSet,
    progress: Arc<dyn ProgressReporter>,
}

/// Runs crawl passes against one store with one instance source.
pub struct Crawler {
    source: Arc<dyn InstanceSource>,
    store: Arc<dyn CrawlStore>,
    settings: CrawlSection,
    progress: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("seed", &self.settings.seed)
            .field("workers", &self.settings.workers)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    pub fn new(
        source: Arc<dyn InstanceSource>,
        store: Arc<dyn CrawlStore>,
        settings: CrawlSection,
    ) -> Self {
        Self {
            source,
            store,
            settings,
            progress: Arc::new(NoopReporter),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Seed the frontier from the store and drain it.
    pub async fn run(&self, options: PassOptions) -> crate::error::Result<CrawlSummary> {
        let initial = self.seed_frontier(options).await?;
        self.drain(initial).await
    }

    /// Names to start a pass with.
    async fn seed_frontier(&self, options: PassOptions) -> crate::error::Result<Vec<String>> {
        if self.store.instance_count().await? == 0 {
            let seed = self.settings.seed.trim().to_lowercase();
            info!(seed = %seed, "store is empty, bootstrapping from seed");
            return Ok(vec![seed]);
        }

        let selection = TargetSelection {
            stale_before: if options.all {
                None
            } else {
                Some(Utc::now() - self.settings.staleness())
            },
            limit: if options.unlimited {
                None
            } else {
                Some(self.settings.instance_scrape_limit)
            },
        };
        let targets = self.store.select_targets(&selection).await?;
        info!(
            selected = targets.len(),
            all = options.all,
            unlimited = options.unlimited,
            "selected crawl targets"
        );
        Ok(targets)
    }

    /// Run the worker pool over `initial` until the frontier drains.
    pub async fn drain(&self, initial: Vec<String>) -> crate::error::Result<CrawlSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("crawl_pass", run_id = %run_id);
        let started = Instant::now();

        // Initial names must have rows before any peer list can point at them.
        for name in &initial {
            self.store.ensure_instance(name).await?;
        }
        let known = InstanceSet::from_names(self.store.instance_names().await?);

        let ctx = Arc::new(PassContext {
            source: Arc::clone(&self.source),
            gateway: PersistenceGateway::new(Arc::clone(&self.store), Arc::new(known)),
            frontier: Frontier::new(),
            processed: InstanceSet::new(),
            progress: Arc::clone(&self.progress),
        });

        let seeded = initial.len() as u64;
        ctx.frontier.extend(initial);
        ctx.progress.start("crawl", seeded);

        let workers = self.settings.workers.max(1);
        info!(parent: &span, seeded, workers, "crawl pass started");

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let ctx = Arc::clone(&ctx);
            pool.spawn(
                async move { run_worker(worker_id, &ctx).await }
                    .instrument(span.clone()),
            );
        }

        let mut summary = CrawlSummary {
            run_id,
            seeded,
            processed: 0,
            succeeded: 0,
            failures: BTreeMap::new(),
            discovered: 0,
            duplicates_skipped: 0,
            commit_errors: 0,
            elapsed: Duration::ZERO,
        };
        let mut worker_failure: Option<String> = None;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(tally) => tally.merge_into(&mut summary),
                Err(e) => {
                    error!(parent: &span, error = %e, "crawl worker died");
                    worker_failure.get_or_insert_with(|| e.to_string());
                }
            }
        }
        ctx.progress.finish();

        if let Some(message) = worker_failure {
            return Err(CrawlError::Worker(message).into());
        }

        summary.elapsed = started.elapsed();
        info!(
            parent: &span,
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed(),
            discovered = summary.discovered,
            duplicates_skipped = summary.duplicates_skipped,
            commit_errors = summary.commit_errors,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "crawl pass finished"
        );
        Ok(summary)
    }
}

/// Pull instances until the frontier drains.
async fn run_worker(worker_id: usize, ctx: &PassContext) -> WorkerTally {
    let mut tally = WorkerTally::default();

    while let Some(ticket) = ctx.frontier.pop().await {
        let name = ticket.name().to_string();

        if !ctx.processed.insert_if_absent(&name) {
            warn!(instance = %name, worker_id, "instance dequeued twice in one pass, skipping");
            tally.duplicates_skipped += 1;
            drop(ticket);
            continue;
        }

        let outcome = match ctx.source.fetch(&name).await {
            Ok(fetched) => {
                let summary = aggregate::reduce(&fetched.posts, &name, fetched.window_start);
                debug!(
                    instance = %name,
                    peers = fetched.peers.len(),
                    posts = summary.posts_inspected,
                    mentioned = summary.mentions.len(),
                    "fetched"
                );
                tally.succeeded += 1;
                CrawlOutcome::Success {
                    metadata: fetched.metadata,
                    peers: fetched.peers,
                    summary,
                }
            }
            Err(failure) => {
                info!(instance = %name, status = %failure.kind, detail = %failure.detail, "crawl failed");
                *tally.failures.entry(failure.kind).or_insert(0) += 1;
                CrawlOutcome::Failed(failure.kind)
            }
        };
        tally.processed += 1;

        match ctx.gateway.commit(&name, outcome).await {
            Ok(discovered) => {
                if !discovered.is_empty() {
                    info!(instance = %name, discovered = discovered.len(), "discovered new instances");
                }
                tally.discovered += discovered.len() as u64;
                // Enqueued before the ticket is acknowledged, so the
                // frontier cannot look drained in between.
                ctx.frontier.extend(discovered);
            }
            Err(e) => {
                error!(instance = %name, error = %e, "failed to commit crawl result");
                tally.commit_errors += 1;
            }
        }

        drop(ticket);
        ctx.progress.advance(&name, ctx.frontier.queued() as u64);
    }

    debug!(worker_id, processed = tally.processed, "worker finished");
    tally
}
