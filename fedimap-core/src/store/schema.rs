/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for fedimap's `SQLite` database.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS fedimap_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per known instance, crawled or not
CREATE TABLE IF NOT EXISTS instances (
    name TEXT PRIMARY KEY,
    description TEXT,
    version TEXT,
    domain_count INTEGER,
    status_count INTEGER,
    user_count INTEGER,
    status TEXT,
    first_seen TEXT NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instances_last_updated ON instances(last_updated);
CREATE INDEX IF NOT EXISTS idx_instances_status ON instances(status);

-- Directed peer links with mention counters for the trailing window
CREATE TABLE IF NOT EXISTS peer_relationships (
    source TEXT NOT NULL REFERENCES instances(name),
    target TEXT NOT NULL REFERENCES instances(name),
    mention_count INTEGER NOT NULL DEFAULT 0,
    statuses_seen INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (source, target)
);
CREATE INDEX IF NOT EXISTS idx_pr_target ON peer_relationships(target);

-- Symmetric weighted edges derived from peer_relationships
CREATE TABLE IF NOT EXISTS edges (
    source TEXT NOT NULL REFERENCES instances(name),
    target TEXT NOT NULL REFERENCES instances(name),
    weight REAL NOT NULL,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (source, target)
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_executes_on_in_memory_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"instances".to_string()));
        assert!(tables.contains(&"peer_relationships".to_string()));
        assert!(tables.contains(&"edges".to_string()));
        assert!(tables.contains(&"fedimap_meta".to_string()));
    }

    #[test]
    fn relationship_pair_is_unique() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute_batch(
            "INSERT INTO instances (name, first_seen, last_updated) VALUES ('a', 't', 't'), ('b', 't', 't');
             INSERT INTO peer_relationships (source, target, first_seen, last_updated) VALUES ('a', 'b', 't', 't');",
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO peer_relationships (source, target, first_seen, last_updated) VALUES ('a', 'b', 't', 't')",
            [],
        );
        assert!(dup.is_err());
    }
}
