//! On-disk state database.
//!
//! # Responsibilities
//! - Hold every store's entries in one versioned JSON document
//! - Load the file lazily on first access
//! - Write through to disk after each update (temp file + rename)
//! - Guarantee one live handle per file in the process
//!
//! # Design Decisions
//! - Reads and writes are serialized by a single mutex over the document
//! - Each update snapshots the document under that mutex; the file write
//!   runs on tokio's blocking pool when called from a runtime, inline
//!   otherwise. Snapshots carry a generation so a stale one never
//!   overwrites a newer file
//! - Malformed or future-version files are never overwritten: the handle
//!   falls back to an in-memory document for the rest of the process
//! - I/O failures are logged and absorbed; the state is a cache

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::state::clock::Clock;

/// Version tag written into the state file.
pub const STATE_FORMAT_VERSION: u32 = 1;

static OPEN_DATABASES: Lazy<DashMap<PathBuf, Weak<StateDb>>> = Lazy::new(DashMap::new);

/// A stored payload and the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreSection {
    #[serde(default)]
    updated_on: Option<u64>,
    #[serde(default)]
    items: BTreeMap<String, StateEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    #[serde(default)]
    stores: BTreeMap<String, StoreSection>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            stores: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct DbInner {
    doc: Option<StateDocument>,
    persistent: bool,
    generation: u64,
}

/// One serialized document waiting to reach the disk.
struct Snapshot {
    path: PathBuf,
    bytes: Vec<u8>,
    generation: u64,
}

impl Snapshot {
    /// Write unless a newer generation is already on disk.
    fn persist(self, written: &Mutex<u64>) {
        let mut last = written.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation <= *last {
            return;
        }

        match persist(&self.path, &self.bytes) {
            Ok(()) => *last = self.generation,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to write state database")
            }
        }
    }
}

/// Handle to the state file shared by all stores.
#[derive(Debug)]
pub struct StateDb {
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    inner: Mutex<DbInner>,
    // generation of the document last written to disk
    written: Arc<Mutex<u64>>,
}

impl StateDb {
    /// Open the database at `path`, or return the live handle already
    /// open for that file.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let key = absolute(path.as_ref());

        match OPEN_DATABASES.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Some(db) = occupied.get().upgrade() {
                    tracing::debug!(path = %key.display(), "Reusing open state database");
                    return db;
                }
                let db = Arc::new(Self::with_path(Some(key), clock));
                occupied.insert(Arc::downgrade(&db));
                db
            }
            Entry::Vacant(vacant) => {
                let db = Arc::new(Self::with_path(Some(key), clock));
                vacant.insert(Arc::downgrade(&db));
                db
            }
        }
    }

    /// A database that is never written to disk.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::with_path(None, clock))
    }

    fn with_path(path: Option<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path,
            clock,
            inner: Mutex::new(DbInner::default()),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Whether updates reach the disk. Forces the lazy load.
    pub fn is_persistent(&self) -> bool {
        self.with_doc(|_, persistent| persistent)
    }

    /// Entry for `key` in `store`, regardless of age.
    pub fn read(&self, store: &str, key: &str) -> Option<StateEntry> {
        self.with_doc(|doc, _| {
            doc.stores
                .get(store)
                .and_then(|section| section.items.get(key))
                .cloned()
        })
    }

    /// Time of the last write to `store`.
    pub fn updated_on(&self, store: &str) -> Option<u64> {
        self.with_doc(|doc, _| doc.stores.get(store).and_then(|section| section.updated_on))
    }

    /// Overwrite `key` in `store` and stamp both with the current time.
    ///
    /// Inside a tokio runtime the file write is handed to the blocking
    /// pool and may land after this returns.
    pub fn write(&self, store: &str, key: &str, payload: serde_json::Value) {
        let Some(snapshot) = self.update(store, key, payload) else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let written = self.written.clone();
                handle.spawn_blocking(move || snapshot.persist(&written));
            }
            Err(_) => snapshot.persist(&self.written),
        }
    }

    /// Apply the update and snapshot the document if it is persisted.
    fn update(&self, store: &str, key: &str, payload: serde_json::Value) -> Option<Snapshot> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_loaded(&mut inner);

        let persistent = inner.persistent;
        let doc = inner.doc.as_mut()?;

        let section = doc.stores.entry(store.to_string()).or_default();
        section.updated_on = Some(now);
        section.items.insert(
            key.to_string(),
            StateEntry {
                timestamp: now,
                payload,
            },
        );

        let path = self.path.as_ref().filter(|_| persistent)?.clone();
        let bytes = match serde_json::to_vec(doc) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to encode state database");
                return None;
            }
        };

        inner.generation += 1;
        Some(Snapshot {
            path,
            bytes,
            generation: inner.generation,
        })
    }

    fn with_doc<R>(&self, f: impl FnOnce(&StateDocument, bool) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_loaded(&mut inner);
        let persistent = inner.persistent;
        match inner.doc.as_ref() {
            Some(doc) => f(doc, persistent),
            None => f(&StateDocument::default(), false),
        }
    }

    fn ensure_loaded(&self, inner: &mut DbInner) {
        if inner.doc.is_some() {
            return;
        }

        let (doc, persistent) = match &self.path {
            Some(path) => load(path),
            None => (StateDocument::default(), false),
        };
        inner.doc = Some(doc);
        inner.persistent = persistent;
    }
}

impl Drop for StateDb {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            OPEN_DATABASES.remove_if(path, |_, weak| weak.strong_count() == 0);
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn load(path: &Path) -> (StateDocument, bool) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No state database yet, starting empty");
            return (StateDocument::default(), true);
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read state database, using memory");
            return (StateDocument::default(), false);
        }
    };

    match serde_json::from_slice::<StateDocument>(&bytes) {
        Ok(doc) if doc.version == STATE_FORMAT_VERSION => {
            tracing::info!(path = %path.display(), stores = doc.stores.len(), "Loaded state database");
            (doc, true)
        }
        Ok(doc) => {
            tracing::warn!(
                path = %path.display(),
                version = doc.version,
                expected = STATE_FORMAT_VERSION,
                "Unsupported state database version, using memory"
            );
            (StateDocument::default(), false)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt state database, using memory");
            (StateDocument::default(), false)
        }
    }
}

fn persist(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
