//! Symmetric interaction graph derived from directional peer relationships.
//!
//! Each unordered instance pair folds the counters of both directions
//! together; the mention ratio of the combined counters becomes the edge
//! weight.

use chrono::{DateTime, Utc};
use petgraph::graphmap::UnGraphMap;

use crate::store::CrawlStore;
use crate::types::{Edge, PeerRelationship};

/// Combined counters of both directions of one instance pair.
#[derive(Debug, Clone, Copy)]
struct PairCounters {
    mentions: u64,
    statuses: u64,
    last_updated: DateTime<Utc>,
}

/// Mention ratio of a pair, or `None` when there is nothing to divide.
#[allow(clippy::cast_precision_loss)]
pub fn interaction_weight(mentions: u64, statuses_seen: u64) -> Option<f64> {
    if mentions == 0 || statuses_seen == 0 {
        return None;
    }
    Some(mentions as f64 / statuses_seen as f64)
}

/// Fold relationships into one edge per connected unordered pair.
///
/// The lexicographically smaller name becomes `source`; `last_updated` is
/// the older of the two directions. Output is sorted by (source, target).
pub fn build_edges(relationships: &[PeerRelationship]) -> Vec<Edge> {
    let mut graph: UnGraphMap<&str, PairCounters> = UnGraphMap::new();

    for rel in relationships {
        if rel.source == rel.target {
            continue;
        }
        let a = rel.source.as_str();
        let b = rel.target.as_str();
        if let Some(pair) = graph.edge_weight_mut(a, b) {
            pair.mentions += rel.mention_count;
            pair.statuses += rel.statuses_seen;
            pair.last_updated = pair.last_updated.min(rel.last_updated);
        } else {
            graph.add_edge(
                a,
                b,
                PairCounters {
                    mentions: rel.mention_count,
                    statuses: rel.statuses_seen,
                    last_updated: rel.last_updated,
                },
            );
        }
    }

    let mut edges: Vec<Edge> = graph
        .all_edges()
        .filter_map(|(a, b, pair)| {
            let weight = interaction_weight(pair.mentions, pair.statuses)?;
            let (source, target) = if a <= b { (a, b) } else { (b, a) };
            Some(Edge {
                source: source.to_string(),
                target: target.to_string(),
                weight,
                last_updated: pair.last_updated,
            })
        })
        .collect();
    edges.sort_by(|x, y| (&x.source, &x.target).cmp(&(&y.source, &y.target)));
    edges
}

/// Rebuild the store's edge table from its successful relationships.
pub async fn rebuild_edges(store: &dyn CrawlStore) -> crate::error::Result<u64> {
    let relationships = store.successful_relationships().await?;
    let edges = build_edges(&relationships);
    let written = store.replace_edges(&edges).await?;
    tracing::info!(
        relationships = relationships.len(),
        edges = written,
        "rebuilt interaction edges"
    );
    Ok(written)
}
