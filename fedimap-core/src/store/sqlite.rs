use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{FedimapError, StoreError};
use crate::types::{
    CrawlOutcome, CrawlRecord, CrawlStatus, Edge, Instance, InstanceMetadata, PeerRelationship,
    RecordStats, StoreStats, TargetSelection,
};

use super::CrawlStore;
use super::schema;

/// SQLite-backed implementation of `CrawlStore`.
///
/// Every method holds the connection mutex for its whole body, and
/// multi-statement writes run inside one transaction, so a failed
/// `record_crawl` leaves no partial rows behind.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(StoreError::Sqlite)?;

        // Try WAL mode; silently ignored for in-memory
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;

        conn.execute(
            "INSERT OR IGNORE INTO fedimap_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        let version: String = conn
            .query_row(
                "SELECT value FROM fedimap_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        if version != schema::SCHEMA_VERSION {
            return Err(StoreError::Migration(format!(
                "database schema version {version}, expected {}",
                schema::SCHEMA_VERSION
            ))
            .into());
        }

        Ok(())
    }

    /// Helper: read a full instance from a row.
    fn row_to_instance(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instance> {
        let status: Option<String> = row.get("status")?;
        let first_seen: String = row.get("first_seen")?;
        let last_updated: String = row.get("last_updated")?;

        Ok(Instance {
            name: row.get("name")?,
            metadata: InstanceMetadata {
                description: row.get("description")?,
                version: row.get("version")?,
                domain_count: row.get("domain_count")?,
                status_count: row.get("status_count")?,
                user_count: row.get("user_count")?,
            },
            status: status.and_then(|s| s.parse::<CrawlStatus>().ok()),
            first_seen: parse_ts(&first_seen),
            last_updated: parse_ts(&last_updated),
        })
    }

    /// Helper: read a relationship from a row.
    fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<PeerRelationship> {
        let first_seen: String = row.get("first_seen")?;
        let last_updated: String = row.get("last_updated")?;

        Ok(PeerRelationship {
            source: row.get("source")?,
            target: row.get("target")?,
            mention_count: row.get("mention_count")?,
            statuses_seen: row.get("statuses_seen")?,
            first_seen: parse_ts(&first_seen),
            last_updated: parse_ts(&last_updated),
        })
    }

    fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
        let last_updated: String = row.get("last_updated")?;
        Ok(Edge {
            source: row.get("source")?,
            target: row.get("target")?,
            weight: row.get("weight")?,
            last_updated: parse_ts(&last_updated),
        })
    }

    fn write_success(
        tx: &rusqlite::Transaction<'_>,
        record: &CrawlRecord,
        metadata: &InstanceMetadata,
        peers: &[String],
        stats: &mut RecordStats,
    ) -> rusqlite::Result<()> {
        let now = format_ts(record.crawled_at);

        tx.execute(
            "INSERT INTO instances (name, description, version, domain_count, status_count,
                                    user_count, status, first_seen, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                version = excluded.version,
                domain_count = excluded.domain_count,
                status_count = excluded.status_count,
                user_count = excluded.user_count,
                status = excluded.status,
                last_updated = excluded.last_updated",
            params![
                record.instance,
                metadata.description,
                metadata.version,
                metadata.domain_count,
                metadata.status_count,
                metadata.user_count,
                CrawlStatus::Success.as_str(),
                now,
            ],
        )?;

        // Placeholders first: relationships reference them by foreign key.
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO instances (name, first_seen, last_updated)
                 VALUES (?1, ?2, ?3)",
            )?;
            for name in &record.new_instances {
                stats.instances_created += insert.execute(params![name, now, epoch_ts()])? as u64;
            }
        }

        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO peer_relationships
                    (source, target, mention_count, statuses_seen, first_seen, last_updated)
                 VALUES (?1, ?2, 0, 0, ?3, ?3)",
            )?;
            for peer in peers {
                stats.relationships_created +=
                    insert.execute(params![record.instance, peer, now])? as u64;
            }
        }

        Ok(())
    }

    fn write_mentions(
        tx: &rusqlite::Transaction<'_>,
        record: &CrawlRecord,
        mentions: &HashMap<String, u64>,
        posts_inspected: u64,
        stats: &mut RecordStats,
    ) -> rusqlite::Result<()> {
        let now = format_ts(record.crawled_at);
        // Only relationships established through the peer list are refreshed;
        // a mention alone never creates one.
        let mut update = tx.prepare_cached(
            "UPDATE peer_relationships
             SET mention_count = ?1, statuses_seen = ?2, last_updated = ?3
             WHERE source = ?4 AND target = ?5",
        )?;
        for (target, count) in mentions {
            stats.relationships_updated += update.execute(params![
                count,
                posts_inspected,
                now,
                record.instance,
                target
            ])? as u64;
        }
        Ok(())
    }
}

/// Fixed-precision RFC 3339 so that text order is chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text).map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc))
}

/// `last_updated` of never-crawled placeholders: stale from the start.
fn epoch_ts() -> String {
    format_ts(DateTime::<Utc>::UNIX_EPOCH)
}

#[async_trait::async_trait]
impl CrawlStore for SqliteStore {
    // ── Instances ──────────────────────────────────────────────────

    async fn ensure_instance(&self, name: &str) -> crate::error::Result<bool> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let created = conn
            .execute(
                "INSERT OR IGNORE INTO instances (name, first_seen, last_updated)
                 VALUES (?1, ?2, ?3)",
                params![name, format_ts(Utc::now()), epoch_ts()],
            )
            .map_err(StoreError::Sqlite)?;
        Ok(created > 0)
    }

    async fn get_instance(&self, name: &str) -> crate::error::Result<Option<Instance>> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        conn.query_row(
            "SELECT * FROM instances WHERE name = ?1",
            params![name],
            Self::row_to_instance,
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(FedimapError::Store)
    }

    async fn instance_names(&self) -> crate::error::Result<Vec<String>> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT name FROM instances ORDER BY name")
            .map_err(StoreError::Sqlite)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(names)
    }

    async fn instance_count(&self) -> crate::error::Result<u64> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let count: u64 = conn
            .query_row("SELECT COUNT(*) FROM instances", [], |row| row.get(0))
            .map_err(StoreError::Sqlite)?;
        Ok(count)
    }

    async fn select_targets(
        &self,
        selection: &TargetSelection,
    ) -> crate::error::Result<Vec<String>> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let mut sql = String::from("SELECT name FROM instances WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(cutoff) = selection.stale_before {
            let _ = write!(sql, " AND last_updated <= ?{}", param_values.len() + 1);
            param_values.push(Box::new(format_ts(cutoff)));
        }
        sql.push_str(" ORDER BY last_updated ASC, name ASC");
        if let Some(limit) = selection.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }

        let mut stmt = conn.prepare(&sql).map_err(StoreError::Sqlite)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> = param_values
            .iter()
            .map(std::convert::AsRef::as_ref)
            .collect();
        let names = stmt
            .query_map(params_ref.as_slice(), |row| row.get(0))
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(StoreError::Sqlite)?;

        Ok(names)
    }

    // ── Crawl results ──────────────────────────────────────────────

    async fn record_crawl(&self, record: &CrawlRecord) -> crate::error::Result<RecordStats> {
        let mut conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        let mut stats = RecordStats::default();

        match &record.outcome {
            CrawlOutcome::Success {
                metadata,
                peers,
                summary,
            } => {
                Self::write_success(&tx, record, metadata, peers, &mut stats)
                    .map_err(StoreError::Sqlite)?;
                if !summary.mentions.is_empty() {
                    Self::write_mentions(
                        &tx,
                        record,
                        &summary.mentions,
                        summary.posts_inspected,
                        &mut stats,
                    )
                    .map_err(StoreError::Sqlite)?;
                }
            }
            CrawlOutcome::Failed(kind) => {
                // Metadata from earlier successful crawls is left untouched.
                tx.execute(
                    "INSERT INTO instances (name, status, first_seen, last_updated)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(name) DO UPDATE SET
                        status = excluded.status,
                        last_updated = excluded.last_updated",
                    params![
                        record.instance,
                        kind.as_str(),
                        format_ts(record.crawled_at)
                    ],
                )
                .map_err(StoreError::Sqlite)?;
            }
        }

        // Dropping `tx` without commit rolls everything back on the error paths above.
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(stats)
    }

    // ── Relationships ──────────────────────────────────────────────

    async fn relationships_from(
        &self,
        source: &str,
    ) -> crate::error::Result<Vec<PeerRelationship>> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let mut stmt = conn
            .prepare_cached("SELECT * FROM peer_relationships WHERE source = ?1 ORDER BY target")
            .map_err(StoreError::Sqlite)?;
        let rels = stmt
            .query_map(params![source], Self::row_to_relationship)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(rels)
    }

    async fn successful_relationships(&self) -> crate::error::Result<Vec<PeerRelationship>> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT r.* FROM peer_relationships r
                 JOIN instances s ON s.name = r.source
                 JOIN instances t ON t.name = r.target
                 WHERE s.status = ?1 AND t.status = ?1
                 ORDER BY r.source, r.target",
            )
            .map_err(StoreError::Sqlite)?;
        let rels = stmt
            .query_map(
                params![CrawlStatus::Success.as_str()],
                Self::row_to_relationship,
            )
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(rels)
    }

    // ── Derived edges ──────────────────────────────────────────────

    async fn replace_edges(&self, edges: &[Edge]) -> crate::error::Result<u64> {
        let mut conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        tx.execute("DELETE FROM edges", [])
            .map_err(StoreError::Sqlite)?;

        let mut written = 0u64;
        {
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO edges (source, target, weight, last_updated)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(StoreError::Sqlite)?;
            for edge in edges {
                written += insert
                    .execute(params![
                        edge.source,
                        edge.target,
                        edge.weight,
                        format_ts(edge.last_updated)
                    ])
                    .map_err(StoreError::Sqlite)? as u64;
            }
        }

        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(written)
    }

    async fn edges(&self) -> crate::error::Result<Vec<Edge>> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM edges ORDER BY source, target")
            .map_err(StoreError::Sqlite)?;
        let edges = stmt
            .query_map([], Self::row_to_edge)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(edges)
    }

    // ── Metrics ────────────────────────────────────────────────────

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let conn = self.conn.lock().expect("fedimap store mutex poisoned");

        let total_instances: u64 = conn
            .query_row("SELECT COUNT(*) FROM instances", [], |row| row.get(0))
            .map_err(StoreError::Sqlite)?;
        let never_crawled: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM instances WHERE status IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        let total_relationships: u64 = conn
            .query_row("SELECT COUNT(*) FROM peer_relationships", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::Sqlite)?;
        let relationships_with_mentions: u64 = conn
            .query_row(
                "SELECT COUNT(*) FROM peer_relationships WHERE mention_count > 0",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        let total_edges: u64 = conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .map_err(StoreError::Sqlite)?;

        let mut stmt = conn
            .prepare(
                "SELECT status, COUNT(*) FROM instances WHERE status IS NOT NULL GROUP BY status",
            )
            .map_err(StoreError::Sqlite)?;
        let instances_by_status: HashMap<String, u64> = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<HashMap<_, _>>>()
            .map_err(StoreError::Sqlite)?;

        let db_size_bytes = self
            .db_path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map_or(0, |m| m.len());

        Ok(StoreStats {
            total_instances,
            never_crawled,
            instances_by_status,
            total_relationships,
            relationships_with_mentions,
            total_edges,
            db_size_bytes,
        })
    }
}
