use crate::types::{
    CrawlRecord, Edge, Instance, PeerRelationship, RecordStats, StoreStats, TargetSelection,
};

/// The instance store. The crawl and edge builder read/write through this trait.
///
/// Rows are never deleted: instances and relationships accumulate across
/// passes, and only the derived `edges` table is replaced wholesale.
#[async_trait::async_trait]
pub trait CrawlStore: Send + Sync {
    // ── Instances ──────────────────────────────────────────────────

    /// Create a never-crawled placeholder unless `name` already exists.
    /// Returns `true` if a row was created.
    async fn ensure_instance(&self, name: &str) -> crate::error::Result<bool>;

    /// Get an instance by its (lowercase) name.
    async fn get_instance(&self, name: &str) -> crate::error::Result<Option<Instance>>;

    /// Every instance name in the store.
    async fn instance_names(&self) -> crate::error::Result<Vec<String>>;

    async fn instance_count(&self) -> crate::error::Result<u64>;

    /// Instances to seed a pass with, least recently updated first.
    async fn select_targets(
        &self,
        selection: &TargetSelection,
    ) -> crate::error::Result<Vec<String>>;

    // ── Crawl results ──────────────────────────────────────────────

    /// Apply one crawl attempt atomically: upsert the instance, create
    /// placeholders and missing relationships, refresh mention counters.
    async fn record_crawl(&self, record: &CrawlRecord) -> crate::error::Result<RecordStats>;

    // ── Relationships ──────────────────────────────────────────────

    /// Outgoing relationships of `source`, ordered by target.
    async fn relationships_from(
        &self,
        source: &str,
    ) -> crate::error::Result<Vec<PeerRelationship>>;

    /// Relationships whose source and target both last crawled successfully.
    async fn successful_relationships(&self) -> crate::error::Result<Vec<PeerRelationship>>;

    // ── Derived edges ──────────────────────────────────────────────

    /// Replace the whole edge table. Returns the number of edges written.
    async fn replace_edges(&self, edges: &[Edge]) -> crate::error::Result<u64>;

    async fn edges(&self) -> crate::error::Result<Vec<Edge>>;

    // ── Metrics ────────────────────────────────────────────────────

    /// Get summary statistics about the store.
    async fn stats(&self) -> crate::error::Result<StoreStats>;
}
