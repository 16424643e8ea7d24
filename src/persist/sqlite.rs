//! SQLite-backed snapshot store for cross-session persistence.
//! WAL mode, one row per (partition, cache key).

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{PersistError, PersistentStore};
use crate::store::CacheSnapshot;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the snapshot database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, PersistError> {
        let conn = Connection::open(db_path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_cache (
                partition TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                PRIMARY KEY (partition, cache_key)
            );",
        )?;

        info!(path = %db_path.display(), "sqlite snapshot store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, PersistError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_cache (
                partition TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                PRIMARY KEY (partition, cache_key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PersistentStore for SqliteStore {
    fn load(&self) -> Result<CacheSnapshot, PersistError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT partition, cache_key, translated_text FROM translation_cache")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut snapshot = CacheSnapshot::new();
        for row in rows {
            let (partition, key, text) = row?;
            snapshot.entry(partition).or_default().insert(key, text);
        }
        debug!(partitions = snapshot.len(), "sqlite snapshot loaded");
        Ok(snapshot)
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM translation_cache", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO translation_cache
                 (partition, cache_key, translated_text) VALUES (?1, ?2, ?3)",
            )?;
            for (partition, entries) in snapshot {
                for (key, text) in entries {
                    stmt.execute(params![partition, key, text])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM translation_cache", [])?;
        Ok(())
    }
}
