//! Durable storage for the offline queue
//!
//! The offline queue is the only pipeline state that must survive a page or
//! process restart. Storage is read and written at whole-queue granularity so
//! a resync cannot lose concurrently-enqueued entries. SQLite uses embedded
//! migrations managed via PRAGMA user_version.

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::types::OfflineEntry;

/// Whole-queue read/write access to durable storage.
///
/// Implementations must tolerate being unavailable; callers log and swallow
/// failures rather than escalating them.
pub trait QueueStore {
    fn read_all(&self) -> Result<Vec<OfflineEntry>>;
    fn write_all(&mut self, entries: &[OfflineEntry]) -> Result<()>;
}

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: offline queue
    r#"
    CREATE TABLE IF NOT EXISTS offline_queue (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        entry       JSON NOT NULL
    );
    "#,
];

/// SQLite-backed queue store
pub struct SqliteQueueStore {
    conn: Connection,
}

impl SqliteQueueStore {
    /// Open (or create) the store at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory SQLite store, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let target = i as i32 + 1;
            if version < target {
                self.conn.execute_batch(migration)?;
                self.conn
                    .execute_batch(&format!("PRAGMA user_version = {}", target))?;
                tracing::debug!(version = target, "applied queue store migration");
            }
        }

        debug_assert!(MIGRATIONS.len() as i32 == SCHEMA_VERSION);
        Ok(())
    }
}

impl QueueStore for SqliteQueueStore {
    fn read_all(&self) -> Result<Vec<OfflineEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entry FROM offline_queue ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut entries = Vec::new();
        for raw in rows {
            entries.push(serde_json::from_str(&raw?)?);
        }
        Ok(entries)
    }

    fn write_all(&mut self, entries: &[OfflineEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM offline_queue", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO offline_queue (entry) VALUES (?1)")?;
            for entry in entries {
                stmt.execute([serde_json::to_string(entry)?])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-memory queue store: the fallback when durable storage is unavailable,
/// and the store of choice in unit tests. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    entries: Vec<OfflineEntry>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryQueueStore {
    fn read_all(&self) -> Result<Vec<OfflineEntry>> {
        Ok(self.entries.clone())
    }

    fn write_all(&mut self, entries: &[OfflineEntry]) -> Result<()> {
        self.entries = entries.to_vec();
        Ok(())
    }
}
