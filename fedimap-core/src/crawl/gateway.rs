//! Single-writer section in front of the store.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::CrawlStore;
use crate::types::{CrawlOutcome, CrawlRecord};

use super::frontier::InstanceSet;

/// Serializes every crawl write of a pass behind one lock.
///
/// The lock covers the known-set lookup, the store transaction and the
/// known-set update, so two workers that discover the same instance at the
/// same moment can never both create it. The guard is scoped, so it is
/// released on every path out of [`PersistenceGateway::commit`].
pub struct PersistenceGateway {
    store: Arc<dyn CrawlStore>,
    known: Arc<InstanceSet>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("known", &self.known.len())
            .finish_non_exhaustive()
    }
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn CrawlStore>, known: Arc<InstanceSet>) -> Self {
        Self {
            store,
            known,
            write_lock: Mutex::new(()),
        }
    }

    pub fn known(&self) -> &InstanceSet {
        &self.known
    }

    /// Record one crawl attempt and return the peers it introduced.
    ///
    /// On error nothing was written and the known set is unchanged; the
    /// caller logs it and moves on to the next instance.
    pub async fn commit(
        &self,
        instance: &str,
        outcome: CrawlOutcome,
    ) -> crate::error::Result<Vec<String>> {
        let _guard = self.write_lock.lock().await;

        let new_instances: Vec<String> = match &outcome {
            CrawlOutcome::Success { peers, .. } => peers
                .iter()
                .filter(|peer| !self.known.contains(peer))
                .cloned()
                .collect(),
            CrawlOutcome::Failed(_) => Vec::new(),
        };

        let record = CrawlRecord {
            instance: instance.to_string(),
            crawled_at: Utc::now(),
            outcome,
            new_instances,
        };
        let stats = self.store.record_crawl(&record).await?;

        for name in &record.new_instances {
            self.known.insert_if_absent(name);
        }

        debug!(
            instance = %instance,
            status = %record.outcome.status(),
            instances_created = stats.instances_created,
            relationships_created = stats.relationships_created,
            relationships_updated = stats.relationships_updated,
            "committed"
        );

        Ok(record.new_instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{FailureKind, InstanceMetadata, MentionSummary};

    fn success(peers: &[&str]) -> CrawlOutcome {
        CrawlOutcome::Success {
            metadata: InstanceMetadata::default(),
            peers: peers.iter().map(ToString::to_string).collect(),
            summary: MentionSummary::default(),
        }
    }

    async fn gateway_with(names: &[&str]) -> (Arc<SqliteStore>, PersistenceGateway) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        for name in names {
            store.ensure_instance(name).await.unwrap();
        }
        let known = Arc::new(InstanceSet::from_names(
            names.iter().map(ToString::to_string),
        ));
        let gateway = PersistenceGateway::new(store.clone(), known);
        (store, gateway)
    }

    #[tokio::test]
    async fn returns_only_unknown_peers() {
        let (store, gateway) = gateway_with(&["a.social", "b.social"]).await;
        let new = gateway
            .commit("a.social", success(&["b.social", "c.social"]))
            .await
            .unwrap();
        assert_eq!(new, vec!["c.social"]);
        assert!(gateway.known().contains("c.social"));
        assert_eq!(store.relationships_from("a.social").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failure_discovers_nothing() {
        let (store, gateway) = gateway_with(&["x.social"]).await;
        let new = gateway
            .commit("x.social", CrawlOutcome::Failed(FailureKind::NetworkFailure))
            .await
            .unwrap();
        assert!(new.is_empty());
        assert!(store.relationships_from("x.social").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_discovery_of_same_peer_creates_it_once() {
        let names: Vec<String> = (0..8).map(|i| format!("src{i}.social")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (store, gateway) = gateway_with(&refs).await;
        let gateway = Arc::new(gateway);

        let handles: Vec<_> = names
            .iter()
            .map(|name| {
                let gateway = Arc::clone(&gateway);
                let name = name.clone();
                tokio::spawn(async move {
                    gateway
                        .commit(&name, success(&["shared.social"]))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut announced = 0;
        for handle in handles {
            announced += handle.await.unwrap().len();
        }
        assert_eq!(announced, 1, "exactly one worker may enqueue the new peer");
        assert_eq!(store.instance_count().await.unwrap(), 9);
        for name in &names {
            assert_eq!(store.relationships_from(name).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn failed_commit_leaves_known_set_untouched() {
        // The source row is missing, but the upsert creates it; a peer that
        // is "known" without a row makes the relationship insert fail.
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let known = Arc::new(InstanceSet::from_names(vec!["phantom.social".to_string()]));
        let gateway = PersistenceGateway::new(store.clone(), known);

        let result = gateway
            .commit("a.social", success(&["phantom.social", "fresh.social"]))
            .await;
        assert!(result.is_err());
        assert!(!gateway.known().contains("fresh.social"));
        assert!(store.get_instance("fresh.social").await.unwrap().is_none());

        // The lock was released: the next commit goes through.
        let new = gateway.commit("a.social", success(&[])).await.unwrap();
        assert!(new.is_empty());
    }
}
