//! Realtime bridge
//!
//! Keeps cached query data in sync with platform change feeds.
//!
//! # Architecture
//!
//! ```text
//! Screen opens:
//!   1. bridge.watch(WatchSpec { key, channel, policy }) -> WatchHandle
//!   2. Platform subscription scoped to the partition (post, room, user)
//!      ↓
//! Change event:
//!   Merge      → row (optionally enriched) merged into the cached pages by id
//!                (chat, notifications); tail inserts wait while later pages are unloaded
//!   Invalidate → key marked stale, refetch callback runs (comment threads)
//!      ↓
//! Screen closes:
//!   3. WatchHandle dropped → listener task aborted → subscription released
//! ```
//!
//! One watch per cache key: watching a key again replaces the earlier watch.

mod error;
mod merge;

pub use error::{BridgeError, BridgeResult};
pub use merge::{merge_change, MergeOutcome, Placement};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use platform_client::{ChangeKind, ChannelSpec, Realtime, Subscription};
use serde_json::Value;
use query_cache::QueryCache;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Async callback reloading a key after invalidation
pub type Refetch = Arc<dyn Fn() -> BoxFuture<'static, BridgeResult<()>> + Send + Sync>;

/// Async hook completing an inserted row (joined profile fields) before it is merged
pub type Enrich = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

/// How change events reach the cache
#[derive(Clone)]
pub enum SyncPolicy {
    Merge {
        placement: Placement,
        enrich: Option<Enrich>,
    },
    Invalidate {
        refetch: Refetch,
    },
}

impl SyncPolicy {
    pub fn merge(placement: Placement) -> Self {
        Self::Merge {
            placement,
            enrich: None,
        }
    }

    /// Merge policy whose inserted rows pass through `enrich` first
    pub fn merge_enriched<F, Fut>(placement: Placement, enrich: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self::Merge {
            placement,
            enrich: Some(Arc::new(move |row| Box::pin(enrich(row)) as BoxFuture<'static, Value>)),
        }
    }

    pub fn invalidate<F, Fut>(refetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<()>> + Send + 'static,
    {
        Self::Invalidate {
            refetch: Arc::new(move || Box::pin(refetch()) as BoxFuture<'static, BridgeResult<()>>),
        }
    }
}

impl std::fmt::Debug for SyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge { placement, enrich } => f
                .debug_struct("Merge")
                .field("placement", placement)
                .field("enriched", &enrich.is_some())
                .finish(),
            Self::Invalidate { .. } => f.write_str("Invalidate"),
        }
    }
}

/// What to watch and how to apply it
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub key: String,
    pub channel: ChannelSpec,
    pub policy: SyncPolicy,
}

struct ActiveWatch {
    id: u64,
    abort: AbortHandle,
}

type WatchTable = Mutex<HashMap<String, ActiveWatch>>;

/// Realtime bridge
#[derive(Clone)]
pub struct RealtimeBridge {
    realtime: Arc<dyn Realtime>,
    cache: QueryCache,
    watches: Arc<WatchTable>,
    next_id: Arc<AtomicU64>,
}

impl RealtimeBridge {
    pub fn new(realtime: Arc<dyn Realtime>, cache: QueryCache) -> Self {
        Self {
            realtime,
            cache,
            watches: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe and start applying changes to `spec.key`
    ///
    /// Must be called inside a tokio runtime.
    pub fn watch(&self, spec: WatchSpec) -> BridgeResult<WatchHandle> {
        let subscription = self.realtime.subscribe(spec.channel.clone())?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let task = tokio::spawn(listen(
            self.cache.clone(),
            spec.key.clone(),
            spec.policy,
            subscription,
        ));

        let replaced = self.watches.lock().insert(
            spec.key.clone(),
            ActiveWatch {
                id,
                abort: task.abort_handle(),
            },
        );
        if let Some(previous) = replaced {
            previous.abort.abort();
            debug!(key = %spec.key, "Replaced existing watch");
        }

        info!(key = %spec.key, channel = %spec.channel.name, "Watching realtime channel");

        Ok(WatchHandle {
            key: spec.key,
            id,
            task,
            watches: Arc::downgrade(&self.watches),
        })
    }

    pub fn is_watching(&self, key: &str) -> bool {
        self.watches.lock().contains_key(key)
    }

    pub fn active_watches(&self) -> usize {
        self.watches.lock().len()
    }
}

/// Owner of one watch; dropping it stops the listener and releases the subscription
pub struct WatchHandle {
    key: String,
    id: u64,
    task: JoinHandle<()>,
    watches: Weak<WatchTable>,
}

impl WatchHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the listener is still running
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
        let Some(watches) = self.watches.upgrade() else {
            return;
        };
        let mut guard = watches.lock();
        // A newer watch on the same key stays registered
        if guard.get(&self.key).map(|w| w.id) == Some(self.id) {
            guard.remove(&self.key);
            debug!(key = %self.key, "Stopped watching");
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

async fn listen(cache: QueryCache, key: String, policy: SyncPolicy, mut subscription: Subscription) {
    while let Some(mut event) = subscription.recv().await {
        match &policy {
            SyncPolicy::Merge { placement, enrich } => {
                if let (Some(enrich), ChangeKind::Insert) = (enrich, event.kind) {
                    event.new = enrich(std::mem::take(&mut event.new)).await;
                }
                match merge_change(&cache, &key, *placement, &event) {
                    Ok(outcome) => {
                        debug!(key = %key, kind = ?event.kind, outcome = ?outcome, "Merged realtime change")
                    }
                    Err(e) => warn!(key = %key, error = %e, "Failed to merge realtime change"),
                }
            }
            SyncPolicy::Invalidate { refetch } => {
                cache.invalidate(&key);
                if let Err(e) = refetch().await {
                    warn!(key = %key, error = %e, "Refetch after realtime change failed");
                }
            }
        }
    }

    debug!(key = %key, channel = %subscription.channel(), "Realtime subscription closed");
}
