//! Publish/subscribe bus for Kelp head gossip.
//!
//! Replication rides on a channel-per-database pub/sub bus: peers publish
//! their head sets on the database's address channel and merge the head
//! sets they receive. Messages are best-effort — duplicates and reordering
//! are tolerated because merging is idempotent.
//!
//! Two implementations are provided: [`MemoryPubSub`], an in-process hub
//! for tests and single-process clusters, and [`GossipPubSub`], backed by
//! iroh-gossip over QUIC.

mod error;
mod gossip;
mod memory;
mod message;

use bytes::Bytes;
use kelp_types::ReplicaId;
use tokio::sync::broadcast;
use tracing::warn;

pub use error::PubSubError;
pub use gossip::GossipPubSub;
pub use memory::{MemoryHub, MemoryPubSub};
pub use message::HeadsAnnounce;

/// A channel-oriented publish/subscribe bus.
///
/// Channels are disjoint across database addresses; delivery is
/// best-effort. All implementations must be `Send + Sync` for use across
/// async tasks.
#[async_trait::async_trait]
pub trait PubSub: Send + Sync {
    /// Subscribe to a channel, returning a message stream.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, PubSubError>;

    /// Leave a channel.
    async fn unsubscribe(&self, channel: &str) -> Result<(), PubSubError>;

    /// Publish a payload to every subscriber of a channel.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), PubSubError>;

    /// The identities of the other peers currently on a channel.
    async fn peers(&self, channel: &str) -> Result<Vec<ReplicaId>, PubSubError>;
}

/// A stream of messages from one subscribed channel.
pub struct Subscription {
    rx: broadcast::Receiver<Bytes>,
}

impl Subscription {
    fn new(rx: broadcast::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the channel is closed. Skips over lagged
    /// messages with a warning — the next heads announcement supersedes
    /// anything that was missed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "pub/sub subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
