//! In-process pub/sub hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use kelp_types::ReplicaId;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::PubSubError;
use crate::{PubSub, Subscription};

/// Broadcast buffer per channel.
const CHANNEL_CAPACITY: usize = 256;

/// The shared switchboard every in-process peer attaches to.
///
/// One hub models one network: managers in the same test share a hub and
/// their publications reach each other (and themselves — merging one's own
/// heads is a no-op, so self-delivery is harmless).
#[derive(Default)]
pub struct MemoryHub {
    channels: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    /// channel → subscriber identity → live subscription count.
    subscribers: Mutex<HashMap<String, HashMap<ReplicaId, usize>>>,
}

impl MemoryHub {
    /// Create a new hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Bytes> {
        let mut channels = self.channels.lock().expect("lock poisoned");
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// One peer's attachment to a [`MemoryHub`].
pub struct MemoryPubSub {
    hub: Arc<MemoryHub>,
    identity: ReplicaId,
}

impl MemoryPubSub {
    /// Attach a peer with the given identity to the hub.
    pub fn new(hub: Arc<MemoryHub>, identity: ReplicaId) -> Self {
        Self { hub, identity }
    }
}

#[async_trait::async_trait]
impl PubSub for MemoryPubSub {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, PubSubError> {
        let sender = self.hub.sender(channel);

        let mut subscribers = self.hub.subscribers.lock().expect("lock poisoned");
        *subscribers
            .entry(channel.to_string())
            .or_default()
            .entry(self.identity)
            .or_insert(0) += 1;

        debug!(channel, identity = %self.identity, "subscribed");
        Ok(Subscription::new(sender.subscribe()))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), PubSubError> {
        let mut subscribers = self.hub.subscribers.lock().expect("lock poisoned");

        if let Some(on_channel) = subscribers.get_mut(channel)
            && let Some(count) = on_channel.get_mut(&self.identity)
        {
            *count -= 1;
            if *count == 0 {
                on_channel.remove(&self.identity);
            }
        }

        debug!(channel, identity = %self.identity, "unsubscribed");
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), PubSubError> {
        let sender = self.hub.sender(channel);
        // No receivers is fine — delivery is best-effort.
        let _ = sender.send(payload);
        Ok(())
    }

    async fn peers(&self, channel: &str) -> Result<Vec<ReplicaId>, PubSubError> {
        let subscribers = self.hub.subscribers.lock().expect("lock poisoned");
        Ok(subscribers
            .get(channel)
            .map(|on_channel| {
                on_channel
                    .keys()
                    .filter(|id| **id != self.identity)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
