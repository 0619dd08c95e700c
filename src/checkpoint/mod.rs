pub mod csv;
pub mod sqlite;

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::error::Result;
use crate::pairs::PairKey;

/// Durable storage for processed pairs.
pub trait CheckpointLog: Send {
    /// Every pair recorded so far. A missing store is an empty set.
    fn load(&mut self) -> Result<HashSet<PairKey>>;

    /// Persist one pair; durable once this returns `Ok`.
    fn append(&mut self, key: &PairKey) -> Result<()>;

    /// Rewrite the store so it holds exactly `keys`.
    fn compact(&mut self, keys: &HashSet<PairKey>) -> Result<()>;
}

/// Pick a backend from the file extension: `.sqlite` / `.db` use SQLite,
/// anything else is an append-only CSV log.
pub fn open(path: &Path) -> Result<Box<dyn CheckpointLog>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("sqlite") | Some("db") => Ok(Box::new(sqlite::SqliteCheckpoint::open(path)?)),
        _ => Ok(Box::new(csv::CsvCheckpoint::open(path)?)),
    }
}

struct Inner {
    keys: HashSet<PairKey>,
    log: Box<dyn CheckpointLog>,
}

/// The shared set of attempted pairs.
///
/// All mutation goes through one mutex that also guards the durable log, so
/// concurrent `record` calls serialize and a key is only visible in memory
/// after its append succeeded.
pub struct ProcessedSet {
    inner: Mutex<Inner>,
}

impl ProcessedSet {
    pub fn open(mut log: Box<dyn CheckpointLog>) -> Result<Self> {
        let keys = log.load()?;
        info!("Checkpoint holds {} processed pairs", keys.len());
        Ok(ProcessedSet {
            inner: Mutex::new(Inner { keys, log }),
        })
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        ProcessedSet::open(open(path)?)
    }

    pub fn contains(&self, key: &PairKey) -> bool {
        self.lock().keys.contains(key)
    }

    /// Durably record `key`. Returns `false` if it was already present.
    pub fn record(&self, key: PairKey) -> Result<bool> {
        let mut inner = self.lock();
        if inner.keys.contains(&key) {
            return Ok(false);
        }
        inner.log.append(&key)?;
        inner.keys.insert(key);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current keys.
    pub fn snapshot(&self) -> HashSet<PairKey> {
        self.lock().keys.clone()
    }

    pub fn compact(&self) -> Result<()> {
        let mut inner = self.lock();
        let Inner { keys, log } = &mut *inner;
        log.compact(keys)
    }

    // A panic while holding the lock cannot leave the set half-updated:
    // the insert is the last step of `record`.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}
