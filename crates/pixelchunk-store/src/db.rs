//! SQLite persistence for a single project's commit graph.
//!
//! Append-only snapshots table with per-snapshot chunk writes; the
//! branch pointer is the only mutable row. One database file per
//! project — there are no cross-project references.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, TransactionBehavior, params};

/// A snapshot row: commit metadata without its chunk writes.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub id: String,
    pub parent: Option<String>,
    pub message: String,
    /// Unix millis.
    pub written_at: i64,
}

/// Outcome of the conditional branch-tip advance.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The tip matched the expected snapshot; the new snapshot was
    /// appended and the pointer advanced.
    Advanced,
    /// Another commit got there first. Carries the tip that won.
    TipMoved(String),
}

const SCHEMA: &str = r#"
-- Project metadata (dimensions, creation time); written once at create
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Commit graph (append-only, immutable)
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    parent TEXT REFERENCES snapshots(id),
    message TEXT NOT NULL,
    written_at INTEGER NOT NULL
);

-- Chunk writes recorded by each snapshot (delta against its parent)
CREATE TABLE IF NOT EXISTS chunk_writes (
    snapshot_id TEXT NOT NULL REFERENCES snapshots(id),
    chunk_index INTEGER NOT NULL,
    rgba BLOB NOT NULL,
    PRIMARY KEY (snapshot_id, chunk_index)
);

-- Branch pointers; advancing a tip is the only UPDATE in this schema
CREATE TABLE IF NOT EXISTS branches (
    name TEXT PRIMARY KEY,
    tip TEXT NOT NULL REFERENCES snapshots(id)
);
"#;

/// Database handle for one project's versioned store.
pub struct ProjectDb {
    conn: Connection,
}

impl ProjectDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Set a metadata key. Keys are written once at project creation.
    pub fn set_meta(&self, key: &str, value: &str) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Get a metadata key.
    pub fn get_meta(&self, key: &str) -> SqliteResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
    }

    // =========================================================================
    // Commit graph
    // =========================================================================

    /// Append the root snapshot and point a branch at it.
    ///
    /// Only valid on a freshly provisioned database.
    pub fn init_root(
        &mut self,
        branch: &str,
        snapshot_id: &str,
        message: &str,
        written_at: i64,
    ) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshots (id, parent, message, written_at) VALUES (?1, NULL, ?2, ?3)",
            params![snapshot_id, message, written_at],
        )?;
        tx.execute(
            "INSERT INTO branches (name, tip) VALUES (?1, ?2)",
            params![branch, snapshot_id],
        )?;
        tx.commit()
    }

    /// Current tip of a branch.
    pub fn tip(&self, branch: &str) -> SqliteResult<Option<String>> {
        self.conn
            .query_row("SELECT tip FROM branches WHERE name = ?1", params![branch], |row| {
                row.get(0)
            })
            .optional()
    }

    /// Atomic check-and-advance: append a snapshot whose parent is
    /// `expected_tip` and move the branch pointer, all inside one
    /// IMMEDIATE transaction.
    ///
    /// SQLite has no native conditional put, so this transaction *is*
    /// the compare-and-swap layer: the tip is re-read under the write
    /// lock, and under concurrent attempts at most one observes a match.
    pub fn commit_snapshot(
        &mut self,
        branch: &str,
        expected_tip: &str,
        snapshot_id: &str,
        message: &str,
        written_at: i64,
        writes: &[(u32, [u8; 4])],
    ) -> SqliteResult<CasOutcome> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: String =
            tx.query_row("SELECT tip FROM branches WHERE name = ?1", params![branch], |row| {
                row.get(0)
            })?;
        if current != expected_tip {
            return Ok(CasOutcome::TipMoved(current));
        }

        tx.execute(
            "INSERT INTO snapshots (id, parent, message, written_at) VALUES (?1, ?2, ?3, ?4)",
            params![snapshot_id, expected_tip, message, written_at],
        )?;
        for (index, rgba) in writes {
            tx.execute(
                "INSERT INTO chunk_writes (snapshot_id, chunk_index, rgba) VALUES (?1, ?2, ?3)",
                params![snapshot_id, index, rgba.as_slice()],
            )?;
        }
        let updated = tx.execute(
            "UPDATE branches SET tip = ?1 WHERE name = ?2 AND tip = ?3",
            params![snapshot_id, branch, expected_tip],
        )?;
        debug_assert_eq!(updated, 1);

        tx.commit()?;
        Ok(CasOutcome::Advanced)
    }

    /// Get one snapshot's metadata.
    pub fn snapshot(&self, id: &str) -> SqliteResult<Option<SnapshotRow>> {
        self.conn
            .query_row(
                "SELECT id, parent, message, written_at FROM snapshots WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SnapshotRow {
                        id: row.get(0)?,
                        parent: row.get(1)?,
                        message: row.get(2)?,
                        written_at: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    /// Walk parent links from a snapshot to the root, newest first.
    pub fn ancestry(&self, from: &str) -> SqliteResult<Vec<SnapshotRow>> {
        let mut chain = Vec::new();
        let mut cursor = Some(from.to_string());
        while let Some(id) = cursor {
            match self.snapshot(&id)? {
                Some(row) => {
                    cursor = row.parent.clone();
                    chain.push(row);
                }
                None => break,
            }
        }
        Ok(chain)
    }

    /// Chunk writes recorded by one snapshot.
    pub fn writes_for(&self, snapshot_id: &str) -> SqliteResult<Vec<(u32, [u8; 4])>> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_index, rgba FROM chunk_writes WHERE snapshot_id = ?1 ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map(params![snapshot_id], |row| {
            let index: u32 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let rgba: [u8; 4] = blob.as_slice().try_into().map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Blob,
                    format!("expected 4-byte rgba blob, got {}", blob.len()).into(),
                )
            })?;
            Ok((index, rgba))
        })?;
        rows.collect()
    }
}
