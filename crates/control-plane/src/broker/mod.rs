// Pub/Sub broker
// Decision: One registration per live connection, keyed by (channel, handle id)
// Decision: Bounded per-subscriber buffers; a slow subscriber loses messages, never blocks others
//
// Every subscription gets its own handle and its own queue. Removing a
// subscription touches exactly that handle's entry, so connections sharing a
// channel (or a transport) can come and go without disturbing each other.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulseboard_core::Result;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use memory::InMemoryBroker;
pub use postgres::PgBroker;

/// Default per-subscriber buffer
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1024;

/// Messages are shared between every subscriber of a channel.
pub type BrokerMessage = Arc<str>;

/// Identifies one subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    channel: String,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// A live subscription: its handle and the queue messages arrive on.
/// The queue ends when the subscription is removed or the broker closes.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::Receiver<BrokerMessage>,
}

/// Transient publish/subscribe transport
#[async_trait]
pub trait Broker: Send + Sync {
    /// Deliver `message` to every current subscriber of `channel`
    async fn publish(&self, channel: &str, message: String) -> Result<()>;

    /// Start receiving messages published on `channel` from now on
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;

    /// Remove a subscription. Unknown or already removed handles are ignored.
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()>;

    /// Drop every subscription and refuse further publishes
    async fn close(&self) -> Result<()>;
}

/// Result of removing a handle from the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    /// The handle was registered until now
    pub removed: bool,
    /// No subscriber is left on the handle's channel
    pub channel_empty: bool,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    channels: HashMap<String, HashMap<u64, mpsc::Sender<BrokerMessage>>>,
}

/// Table of `channel -> {handle id -> sender}` shared by every broker
/// implementation.
///
/// Dispatch runs under the registry lock, so all subscribers of a channel
/// observe publishes in the same order.
pub struct SubscriberRegistry {
    inner: Mutex<RegistryInner>,
    buffer: usize,
}

impl SubscriberRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            buffer: buffer.max(1),
        }
    }

    /// Add a subscription. The flag is true when it is the first one on
    /// its channel.
    pub fn register(&self, channel: &str) -> (Subscription, bool) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut inner = self.inner.lock();

        inner.next_id += 1;
        let id = inner.next_id;

        let subscribers = inner.channels.entry(channel.to_string()).or_default();
        let first = subscribers.is_empty();
        subscribers.insert(id, tx);

        debug!(channel, handle = id, subscribers = subscribers.len(), "Subscribed");

        let subscription = Subscription {
            handle: SubscriptionHandle {
                id,
                channel: channel.to_string(),
            },
            receiver: rx,
        };
        (subscription, first)
    }

    pub fn unregister(&self, handle: &SubscriptionHandle) -> Removal {
        let mut inner = self.inner.lock();

        let Some(subscribers) = inner.channels.get_mut(&handle.channel) else {
            return Removal {
                removed: false,
                channel_empty: true,
            };
        };

        let removed = subscribers.remove(&handle.id).is_some();
        let channel_empty = subscribers.is_empty();
        if channel_empty {
            inner.channels.remove(&handle.channel);
        }

        if removed {
            debug!(channel = %handle.channel, handle = handle.id, "Unsubscribed");
        }
        Removal {
            removed,
            channel_empty,
        }
    }

    /// Hand `message` to every subscriber of `channel`. Returns how many
    /// accepted it.
    pub fn dispatch(&self, channel: &str, message: BrokerMessage) -> usize {
        let inner = self.inner.lock();
        let Some(subscribers) = inner.channels.get(channel) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in subscribers {
            match tx.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(channel, handle = id, "Subscriber buffer full, message dropped");
                }
                // Receiver gone; the owner removes the handle when it closes
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .lock()
            .channels
            .get(channel)
            .map_or(0, HashMap::len)
    }

    /// Channels with at least one subscriber
    pub fn channels(&self) -> Vec<String> {
        self.inner.lock().channels.keys().cloned().collect()
    }

    /// Remove every subscription; their queues end.
    pub fn clear(&self) {
        self.inner.lock().channels.clear();
    }
}
