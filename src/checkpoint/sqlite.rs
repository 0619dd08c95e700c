use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use super::CheckpointLog;
use crate::error::Result;
use crate::pairs::PairKey;

/// Processed pairs kept in a single SQLite table.
pub struct SqliteCheckpoint {
    conn: Connection,
}

impl SqliteCheckpoint {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            CREATE TABLE IF NOT EXISTS processed_pairs (
                id_a        TEXT NOT NULL,
                id_b        TEXT NOT NULL,
                recorded_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (id_a, id_b)
            );
            ",
        )?;
        Ok(SqliteCheckpoint { conn })
    }
}

impl CheckpointLog for SqliteCheckpoint {
    fn load(&mut self) -> Result<HashSet<PairKey>> {
        let mut stmt = self.conn.prepare("SELECT id_a, id_b FROM processed_pairs")?;
        let rows = stmt
            .query_map([], |row| {
                let a: String = row.get(0)?;
                let b: String = row.get(1)?;
                Ok(PairKey::new(a, b))
            })?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(rows)
    }

    fn append(&mut self, key: &PairKey) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO processed_pairs (id_a, id_b) VALUES (?1, ?2)")?;
        stmt.execute(rusqlite::params![key.lo(), key.hi()])?;
        Ok(())
    }

    // Primary key already keeps the table unique.
    fn compact(&mut self, _keys: &HashSet<PairKey>) -> Result<()> {
        Ok(())
    }
}
