//! Client query cache
//!
//! The one shared mutable store of the social client. Provides:
//! - Unified key schema with versioning
//! - Typed reads/writes over JSON-encoded entries
//! - Per-key fetch generations (cancel in-flight fetches, discard late results)
//! - Snapshots for optimistic writes and verbatim rollback
//! - Staleness marking with change events for views
//! - Metrics integration
//!
//! The cache is an explicitly constructed context: clone it to share, create
//! a new one per test.

mod error;
mod keys;
mod metrics;

pub mod pages;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use metrics::{CacheMetrics, WriteSource};
pub use pages::{Cursor, Page, Pages};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered change events per receiver
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Stored value of one key
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: Value,
    pub updated_at: DateTime<Utc>,
    /// Marked by invalidation, cleared by the next committed fetch
    pub stale: bool,
}

/// Change notification for views
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(String),
    Invalidated(String),
    Removed(String),
    Restored(String),
}

/// Generation a fetch started under
///
/// A fetch result is committed only if no cancellation happened in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: String,
    generation: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Prior values of a set of keys, `None` for keys that were absent
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(String, Option<CacheEntry>)>,
}

impl Snapshot {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    generations: HashMap<String, u64>,
}

/// Query cache client
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<RwLock<CacheState>>,
    events: broadcast::Sender<CacheEvent>,
    metrics: CacheMetrics,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_metrics(CacheMetrics::new())
    }

    pub fn with_metrics(metrics: CacheMetrics) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            events,
            metrics,
        }
    }

    /// Read and decode a value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let data = {
            let state = self.state.read();
            state.entries.get(key).map(|e| e.data.clone())
        };

        match data {
            Some(data) => {
                debug!(key = %key, "Cache hit");
                self.metrics.record_hit(key);
                Ok(Some(serde_json::from_value(data)?))
            }
            None => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss(key);
                Ok(None)
            }
        }
    }

    /// Raw entry, including staleness
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.state.read().entries.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Unconditional write
    ///
    /// Loaders go through [`QueryCache::commit_fetch`]; this is for
    /// optimistic writes and realtime merges.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, source: WriteSource) -> CacheResult<()> {
        let data = serde_json::to_value(value)?;
        self.state.write().entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                updated_at: Utc::now(),
                stale: false,
            },
        );

        debug!(key = %key, source = ?source, "Cache set");
        self.metrics.record_write(key, source);
        self.notify(CacheEvent::Updated(key.to_string()));
        Ok(())
    }

    /// Read-modify-write of an existing entry under one lock
    ///
    /// Returns `false` without calling `f` when the key is absent.
    pub fn update<T, F>(&self, key: &str, source: WriteSource, f: F) -> CacheResult<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        {
            let mut state = self.state.write();
            let Some(entry) = state.entries.get_mut(key) else {
                return Ok(false);
            };

            let mut value: T = serde_json::from_value(entry.data.clone())?;
            f(&mut value);
            entry.data = serde_json::to_value(&value)?;
            entry.updated_at = Utc::now();
        }

        debug!(key = %key, source = ?source, "Cache update");
        self.metrics.record_write(key, source);
        self.notify(CacheEvent::Updated(key.to_string()));
        Ok(true)
    }

    /// Present keys starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let state = self.state.read();
        let mut keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    // ============= Fetch Generations =============

    /// Record the generation a fetch for `key` starts under
    pub fn begin_fetch(&self, key: &str) -> FetchTicket {
        FetchTicket {
            key: key.to_string(),
            generation: self.generation(key),
        }
    }

    /// Store a fetch result unless the key was cancelled since `begin_fetch`
    ///
    /// Returns `false` when the result was discarded.
    pub fn commit_fetch<T: Serialize>(&self, ticket: &FetchTicket, value: &T) -> CacheResult<bool> {
        let data = serde_json::to_value(value)?;
        {
            let mut state = self.state.write();
            let current = state.generations.get(&ticket.key).copied().unwrap_or(0);
            if current != ticket.generation {
                drop(state);
                debug!(
                    key = %ticket.key,
                    started = ticket.generation,
                    current,
                    "Discarding superseded fetch result"
                );
                self.metrics.record_discarded_fetch(&ticket.key);
                return Ok(false);
            }

            state.entries.insert(
                ticket.key.clone(),
                CacheEntry {
                    data,
                    updated_at: Utc::now(),
                    stale: false,
                },
            );
        }

        self.metrics.record_write(&ticket.key, WriteSource::Fetch);
        self.notify(CacheEvent::Updated(ticket.key.clone()));
        Ok(true)
    }

    /// Like [`QueryCache::commit_fetch`], but builds the stored value from the
    /// current one under the same lock (appending a page, for instance)
    pub fn commit_fetch_with<T, F>(&self, ticket: &FetchTicket, f: F) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> T,
    {
        let value = {
            let mut state = self.state.write();
            let current = state.generations.get(&ticket.key).copied().unwrap_or(0);
            if current != ticket.generation {
                drop(state);
                debug!(key = %ticket.key, "Discarding superseded fetch result");
                self.metrics.record_discarded_fetch(&ticket.key);
                return Ok(None);
            }

            let existing = match state.entries.get(&ticket.key) {
                Some(entry) => Some(serde_json::from_value(entry.data.clone())?),
                None => None,
            };
            let value = f(existing);
            state.entries.insert(
                ticket.key.clone(),
                CacheEntry {
                    data: serde_json::to_value(&value)?,
                    updated_at: Utc::now(),
                    stale: false,
                },
            );
            value
        };

        self.metrics.record_write(&ticket.key, WriteSource::Fetch);
        self.notify(CacheEvent::Updated(ticket.key.clone()));
        Ok(Some(value))
    }

    /// Cancel in-flight fetches for `key`: their results will be discarded
    pub fn cancel(&self, key: &str) {
        {
            let mut state = self.state.write();
            *state.generations.entry(key.to_string()).or_insert(0) += 1;
        }
        debug!(key = %key, "Cancelled in-flight fetches");
        self.metrics.record_cancellation(key);
    }

    pub fn cancel_many(&self, keys: &[String]) {
        for key in keys {
            self.cancel(key);
        }
    }

    pub fn generation(&self, key: &str) -> u64 {
        self.state
            .read()
            .generations
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    // ============= Invalidation =============

    /// Mark an entry stale so its owner refetches; returns whether it existed
    pub fn invalidate(&self, key: &str) -> bool {
        let existed = {
            let mut state = self.state.write();
            match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.stale = true;
                    true
                }
                None => false,
            }
        };

        if existed {
            debug!(key = %key, "Cache invalidate");
            self.metrics.record_invalidation(key);
            self.notify(CacheEvent::Invalidated(key.to_string()));
        }
        existed
    }

    pub fn is_stale(&self, key: &str) -> bool {
        self.state
            .read()
            .entries
            .get(key)
            .map(|e| e.stale)
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.state.write().entries.remove(key).is_some();
        if removed {
            self.notify(CacheEvent::Removed(key.to_string()));
        }
        removed
    }

    pub fn clear(&self) {
        let keys: Vec<String> = {
            let mut state = self.state.write();
            state.generations.clear();
            state.entries.drain().map(|(k, _)| k).collect()
        };
        for key in keys {
            self.notify(CacheEvent::Removed(key));
        }
    }

    // ============= Snapshots =============

    /// Capture the current value of each key (absent keys included)
    pub fn snapshot(&self, keys: &[String]) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            entries: keys
                .iter()
                .map(|k| (k.clone(), state.entries.get(k).cloned()))
                .collect(),
        }
    }

    /// Put every snapshotted key back exactly as captured
    pub fn restore(&self, snapshot: Snapshot) {
        {
            let mut state = self.state.write();
            for (key, entry) in &snapshot.entries {
                match entry {
                    Some(entry) => {
                        state.entries.insert(key.clone(), entry.clone());
                    }
                    None => {
                        state.entries.remove(key);
                    }
                }
            }
        }

        for (key, _) in snapshot.entries {
            debug!(key = %key, "Cache restored from snapshot");
            self.metrics.record_rollback(&key);
            self.notify(CacheEvent::Restored(key));
        }
    }

    // ============= Events =============

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: CacheEvent) {
        // No receivers is fine: views may not be listening
        let _ = self.events.send(event);
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
    }

    #[test]
    fn test_set_and_get() {
        let cache = QueryCache::new();
        cache
            .set("v1:post:1", &Counter { count: 3 }, WriteSource::Fetch)
            .unwrap();
        let value: Option<Counter> = cache.get("v1:post:1").unwrap();
        assert_eq!(value, Some(Counter { count: 3 }));
        let missing: Option<Counter> = cache.get("v1:post:2").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_update_missing_key_is_noop() {
        let cache = QueryCache::new();
        let mut called = false;
        let updated = cache
            .update::<Counter, _>("v1:post:1", WriteSource::Optimistic, |_| called = true)
            .unwrap();
        assert!(!updated);
        assert!(!called);
    }

    #[test]
    fn test_update_in_place() {
        let cache = QueryCache::new();
        cache
            .set("v1:post:1", &Counter { count: 3 }, WriteSource::Fetch)
            .unwrap();
        cache
            .update::<Counter, _>("v1:post:1", WriteSource::Optimistic, |c| c.count += 1)
            .unwrap();
        assert_eq!(
            cache.get::<Counter>("v1:post:1").unwrap(),
            Some(Counter { count: 4 })
        );
    }

    #[test]
    fn test_cancel_discards_in_flight_fetch() {
        let cache = QueryCache::new();
        let ticket = cache.begin_fetch("v1:comments:1");
        cache.cancel("v1:comments:1");
        let committed = cache.commit_fetch(&ticket, &Counter { count: 9 }).unwrap();
        assert!(!committed);
        assert!(!cache.contains_key("v1:comments:1"));

        let fresh = cache.begin_fetch("v1:comments:1");
        assert!(cache.commit_fetch(&fresh, &Counter { count: 1 }).unwrap());
    }

    #[test]
    fn test_commit_fetch_with_sees_current_value() {
        let cache = QueryCache::new();
        cache
            .set("v1:chat:1", &Counter { count: 2 }, WriteSource::Fetch)
            .unwrap();
        let ticket = cache.begin_fetch("v1:chat:1");
        cache
            .set("v1:chat:1", &Counter { count: 3 }, WriteSource::Realtime)
            .unwrap();

        let stored = cache
            .commit_fetch_with(&ticket, |current: Option<Counter>| Counter {
                count: current.map(|c| c.count).unwrap_or(0) + 10,
            })
            .unwrap();
        assert_eq!(stored, Some(Counter { count: 13 }));

        cache.cancel("v1:chat:1");
        let discarded = cache
            .commit_fetch_with(&ticket, |_: Option<Counter>| Counter { count: 0 })
            .unwrap();
        assert!(discarded.is_none());
    }

    #[test]
    fn test_snapshot_restore_is_verbatim() {
        let cache = QueryCache::new();
        cache
            .set("v1:post:1", &Counter { count: 5 }, WriteSource::Fetch)
            .unwrap();
        let before = cache.entry("v1:post:1").unwrap();

        let keys = vec!["v1:post:1".to_string(), "v1:post:2".to_string()];
        let snapshot = cache.snapshot(&keys);
        cache
            .set("v1:post:1", &Counter { count: 6 }, WriteSource::Optimistic)
            .unwrap();
        cache
            .set("v1:post:2", &Counter { count: 1 }, WriteSource::Optimistic)
            .unwrap();

        cache.restore(snapshot);
        assert_eq!(cache.entry("v1:post:1"), Some(before));
        assert!(!cache.contains_key("v1:post:2"));
    }

    #[test]
    fn test_invalidate_marks_stale_until_fetch() {
        let cache = QueryCache::new();
        assert!(!cache.invalidate("v1:post:1"));

        cache
            .set("v1:post:1", &Counter { count: 1 }, WriteSource::Fetch)
            .unwrap();
        assert!(cache.invalidate("v1:post:1"));
        assert!(cache.is_stale("v1:post:1"));

        let ticket = cache.begin_fetch("v1:post:1");
        cache.commit_fetch(&ticket, &Counter { count: 2 }).unwrap();
        assert!(!cache.is_stale("v1:post:1"));
    }

    #[test]
    fn test_keys_with_prefix() {
        let cache = QueryCache::new();
        for key in ["v1:posts:feed", "v1:posts:user:1", "v1:post:1"] {
            cache.set(key, &Counter { count: 0 }, WriteSource::Fetch).unwrap();
        }
        assert_eq!(
            cache.keys_with_prefix(&CacheKey::post_lists_prefix()),
            vec!["v1:posts:feed".to_string(), "v1:posts:user:1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let cache = QueryCache::new();
        let mut events = cache.subscribe();
        cache
            .set("v1:post:1", &Counter { count: 1 }, WriteSource::Fetch)
            .unwrap();
        cache.invalidate("v1:post:1");
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Updated("v1:post:1".to_string())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Invalidated("v1:post:1".to_string())
        );
    }
}
