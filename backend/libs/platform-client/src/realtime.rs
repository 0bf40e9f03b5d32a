//! In-process realtime hub
//!
//! Fans row changes out to subscribers whose channel accepts them. Both
//! platform implementations publish their own writes here.

use crate::traits::{ChangeEvent, ChannelSpec, Realtime, Subscription};
use crate::PlatformResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use uuid::Uuid;

/// Unique identifier for a realtime subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    spec: ChannelSpec,
    sender: UnboundedSender<ChangeEvent>,
}

type Registry = Mutex<HashMap<SubscriberId, Subscriber>>;

/// Realtime hub
#[derive(Default, Clone)]
pub struct LocalRealtime {
    inner: Arc<Registry>,
}

impl LocalRealtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every accepting subscriber, returning how many got it
    ///
    /// Dead senders are cleaned up on the way.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let mut guard = self.inner.lock();
        let before = guard.len();
        let mut delivered = 0;

        guard.retain(|_, subscriber| {
            if !subscriber.spec.accepts(event) {
                return true;
            }
            let alive = subscriber.sender.send(event.clone()).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });

        if guard.len() != before {
            tracing::debug!(
                "Publish on {}: {} dead subscribers cleaned up, {} active",
                event.table,
                before - guard.len(),
                guard.len()
            );
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    fn remove(registry: &Weak<Registry>, id: SubscriberId) {
        let Some(registry) = registry.upgrade() else {
            return;
        };
        let removed = registry.lock().remove(&id);
        if let Some(subscriber) = removed {
            tracing::debug!(
                "Released subscriber {:?} on channel {}",
                id,
                subscriber.spec.name
            );
        }
    }
}

impl Realtime for LocalRealtime {
    fn subscribe(&self, spec: ChannelSpec) -> PlatformResult<Subscription> {
        let (tx, rx) = unbounded_channel();
        let id = SubscriberId::new();
        let channel = spec.name.clone();

        let total = {
            let mut guard = self.inner.lock();
            guard.insert(id, Subscriber { spec, sender: tx });
            guard.len()
        };
        tracing::debug!(
            "Added subscriber {:?} on channel {}, total subscribers: {}",
            id,
            channel,
            total
        );

        let registry = Arc::downgrade(&self.inner);
        Ok(Subscription::new(channel, rx, move || {
            LocalRealtime::remove(&registry, id)
        }))
    }
}
