//! TTL-bounded keyed state stores.
//!
//! # Data Flow
//! ```text
//! StateRegistry::store(name) ──▶ StateStore (one per name)
//!     get(key) ──▶ StateDb::read ──▶ age check ──▶ hit | miss | expired
//!     set(key) ──▶ StateDb::write ──▶ temp file + rename
//! ```
//!
//! # Design Decisions
//! - Stale entries are treated as absent but stay on disk until overwritten
//! - No background eviction
//! - Serialization and I/O failures are logged, never returned

pub mod clock;
pub mod db;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::observability::metrics;

pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{StateDb, StateEntry, STATE_FORMAT_VERSION};

/// One namespace of the state database.
#[derive(Debug, Clone)]
pub struct StateStore {
    name: Arc<str>,
    lifetime: Option<Duration>,
    db: Arc<StateDb>,
}

impl StateStore {
    pub fn new(name: impl Into<Arc<str>>, lifetime: Option<Duration>, db: Arc<StateDb>) -> Self {
        Self {
            name: name.into(),
            lifetime,
            db,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry lifetime, `None` when unbounded.
    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    /// Payload for `key` if present and younger than the lifetime.
    pub fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        let Some(entry) = self.db.read(&self.name, key) else {
            metrics::record_state_read(&self.name, "miss");
            return None;
        };

        if let Some(lifetime) = self.lifetime {
            let elapsed = self.db.now_ms().saturating_sub(entry.timestamp);
            if u128::from(elapsed) >= lifetime.as_millis() {
                metrics::record_state_read(&self.name, "expired");
                return None;
            }
        }

        metrics::record_state_read(&self.name, "hit");
        Some(entry.payload)
    }

    /// Typed read. A payload of the wrong shape reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get_raw(key)?;
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(store = %self.name, key, error = %e, "Discarding unreadable state entry");
                None
            }
        }
    }

    /// Overwrite `key`, resetting its age.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(payload) => self.db.write(&self.name, key, payload),
            Err(e) => {
                tracing::warn!(store = %self.name, key, error = %e, "Cannot serialize state entry");
            }
        }
    }

    /// Seconds since the last write to this store, infinite if never written.
    pub fn age_seconds(&self) -> f64 {
        match self.db.updated_on(&self.name) {
            Some(updated) => self.db.now_ms().saturating_sub(updated) as f64 / 1000.0,
            None => f64::INFINITY,
        }
    }
}

/// Process-scoped owner of state stores, one per name.
#[derive(Debug)]
pub struct StateRegistry {
    db: Arc<StateDb>,
    stores: DashMap<String, StateStore>,
}

impl StateRegistry {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self {
            db,
            stores: DashMap::new(),
        }
    }

    /// Registry over a database that never touches disk.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(StateDb::in_memory(clock))
    }

    pub fn db(&self) -> &Arc<StateDb> {
        &self.db
    }

    /// Store `name` with unbounded lifetime, or the existing one.
    pub fn store(&self, name: &str) -> StateStore {
        self.store_with_lifetime(name, None)
    }

    /// Store `name`. The lifetime only applies when the store is first created.
    pub fn store_with_lifetime(&self, name: &str, lifetime: Option<Duration>) -> StateStore {
        self.stores
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(store = name, ?lifetime, "Opening state store");
                StateStore::new(name, lifetime, self.db.clone())
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ManualClock, StateRegistry) {
        let clock = ManualClock::at_ms(1_000_000);
        let registry = StateRegistry::in_memory(Arc::new(clock.clone()));
        (clock, registry)
    }

    #[test]
    fn test_ttl_expiry_and_reset() {
        let (clock, registry) = registry();
        let store = registry.store_with_lifetime("s", Some(Duration::from_secs(10)));

        store.set("k", &"v");
        assert_eq!(store.get::<String>("k").as_deref(), Some("v"));

        clock.advance(Duration::from_secs(9));
        assert!(store.get::<String>("k").is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.get::<String>("k").is_none());

        store.set("k", &"w");
        assert_eq!(store.age_seconds(), 0.0);
        assert_eq!(store.get::<String>("k").as_deref(), Some("w"));
    }

    #[test]
    fn test_unbounded_lifetime() {
        let (clock, registry) = registry();
        let store = registry.store("s");
        store.set("k", &42u32);
        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert_eq!(store.get::<u32>("k"), Some(42));
    }

    #[test]
    fn test_age_seconds() {
        let (clock, registry) = registry();
        let store = registry.store("s");
        assert!(store.age_seconds().is_infinite());

        store.set("k", &1);
        clock.advance(Duration::from_millis(2_500));
        assert_eq!(store.age_seconds(), 2.5);
    }

    #[test]
    fn test_singleton_by_name() {
        let (_clock, registry) = registry();
        let a = registry.store_with_lifetime("s", Some(Duration::from_secs(5)));
        let b = registry.store("s");
        assert_eq!(b.lifetime(), Some(Duration::from_secs(5)));
        assert_eq!(registry.len(), 1);

        a.set("k", &"shared");
        assert_eq!(b.get::<String>("k").as_deref(), Some("shared"));
    }

    #[test]
    fn test_stores_are_namespaced() {
        let (_clock, registry) = registry();
        registry.store("a").set("k", &1);
        assert!(registry.store("b").get::<i32>("k").is_none());
    }

    #[test]
    fn test_wrong_shape_reads_as_absent() {
        let (_clock, registry) = registry();
        let store = registry.store("s");
        store.set("k", &"text");
        assert!(store.get::<u64>("k").is_none());
    }
}
