//! Durable snapshot storage for the translation cache.
//!
//! The snapshot shape is nested string-keyed maps (partition -> key -> text)
//! so it can live in a flat JSON file, a SQLite table or an in-memory stub
//! interchangeably. Saves are best-effort: the service logs failures and the
//! in-memory cache stays authoritative.

pub mod sqlite;

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::CacheSnapshot;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Pluggable snapshot store.
///
/// `load` returns an empty snapshot when nothing was persisted yet. The
/// store never calls back into the service.
pub trait PersistentStore: Send + Sync {
    fn load(&self) -> Result<CacheSnapshot, PersistError>;
    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError>;
    fn clear(&self) -> Result<(), PersistError>;
}

impl<P: PersistentStore + ?Sized> PersistentStore for std::sync::Arc<P> {
    fn load(&self) -> Result<CacheSnapshot, PersistError> {
        (**self).load()
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError> {
        (**self).save(snapshot)
    }

    fn clear(&self) -> Result<(), PersistError> {
        (**self).clear()
    }
}

/// Snapshot store backed by a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PersistentStore for JsonFileStore {
    fn load(&self) -> Result<CacheSnapshot, PersistError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no persisted cache");
            return Ok(CacheSnapshot::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let snapshot: CacheSnapshot = serde_json::from_str(&content)?;
        info!(
            path = %self.path.display(),
            partitions = snapshot.len(),
            "persisted cache loaded"
        );
        Ok(snapshot)
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string(snapshot)?;
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "cache snapshot saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-memory stub store, mainly for tests and pre-seeding.
#[derive(Default)]
pub struct InMemoryStore {
    snapshot: Mutex<CacheSnapshot>,
    saves: Mutex<u32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the store with an existing snapshot.
    pub fn seeded(snapshot: CacheSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            saves: Mutex::new(0),
        }
    }

    /// Number of completed `save` calls. Lets tests observe debouncing.
    pub fn save_count(&self) -> u32 {
        *self.saves.lock()
    }

    pub fn contents(&self) -> CacheSnapshot {
        self.snapshot.lock().clone()
    }
}

impl PersistentStore for InMemoryStore {
    fn load(&self) -> Result<CacheSnapshot, PersistError> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistError> {
        *self.snapshot.lock() = snapshot.clone();
        *self.saves.lock() += 1;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        self.snapshot.lock().clear();
        Ok(())
    }
}
