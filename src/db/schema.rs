// Database schema: table creation.
//
// A `schema_version` table records which schema the file was created with so
// later changes have somewhere to hang migrations.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent and safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS topics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Participant statements. Immutable once submitted.
        CREATE TABLE IF NOT EXISTS opinions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic_id INTEGER NOT NULL REFERENCES topics(id),
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            weight INTEGER NOT NULL CHECK (weight BETWEEN 1 AND 10),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Current clustering of a topic. Replaced wholesale on every run.
        CREATE TABLE IF NOT EXISTS clusters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic_id INTEGER NOT NULL REFERENCES topics(id),
            position INTEGER NOT NULL,          -- 0 = largest
            heading TEXT NOT NULL,
            leader_opinion_id INTEGER NOT NULL REFERENCES opinions(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS cluster_members (
            cluster_id INTEGER NOT NULL REFERENCES clusters(id),
            opinion_id INTEGER NOT NULL REFERENCES opinions(id),
            position INTEGER NOT NULL,          -- 0 = leader
            PRIMARY KEY (cluster_id, opinion_id)
        );

        -- One row per finished clustering job
        CREATE TABLE IF NOT EXISTS job_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL,
            topic_id INTEGER NOT NULL,
            state TEXT NOT NULL,                -- queued / running / done / failed
            error TEXT,
            cluster_count INTEGER,
            started_at TEXT NOT NULL,
            finished_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_opinions_topic
            ON opinions(topic_id);

        CREATE INDEX IF NOT EXISTS idx_clusters_topic
            ON clusters(topic_id, position);

        CREATE INDEX IF NOT EXISTS idx_job_runs_topic
            ON job_runs(topic_id);
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        assert_eq!(table_count(&conn).unwrap(), 6);
    }

    #[test]
    fn test_weight_is_constrained() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn.execute("INSERT INTO topics (title) VALUES ('t')", []).unwrap();
        let bad = conn.execute(
            "INSERT INTO opinions (topic_id, author, text, weight) VALUES (1, 'a', 'x', 11)",
            [],
        );
        assert!(bad.is_err());
    }
}
