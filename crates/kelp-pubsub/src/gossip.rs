//! Gossip-backed pub/sub using iroh-gossip.
//!
//! Each channel (database address) maps to its own gossip topic, derived
//! by hashing the channel name. Peers on the same topic exchange head
//! announcements via epidemic broadcast.
//!
//! **Note**: This backend requires a running iroh [`Endpoint`] and
//! [`Router`](iroh::protocol::Router). In environments where iroh cannot
//! bind (e.g. sandboxed CI), use [`MemoryPubSub`](crate::MemoryPubSub).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use futures_lite::StreamExt;
use iroh::Endpoint;
use iroh::protocol::Router;
use iroh_gossip::net::Gossip;
use iroh_gossip::api::{Event, GossipReceiver, GossipSender};
use iroh_gossip::net::GOSSIP_ALPN;
use iroh_gossip::proto::TopicId;
use kelp_types::ReplicaId;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use crate::error::PubSubError;
use crate::{PubSub, Subscription};

/// Maximum gossip message size. Head announcements are small; this bounds
/// a database with a very wide concurrent frontier.
const MAX_MESSAGE_SIZE: usize = 32 * 1024;

/// Broadcast buffer per joined topic.
const TOPIC_CAPACITY: usize = 256;

/// One joined gossip topic.
struct Topic {
    sender: GossipSender,
    fanout: broadcast::Sender<Bytes>,
    neighbors: Arc<RwLock<HashSet<iroh::NodeId>>>,
    task: tokio::task::JoinHandle<()>,
}

/// Pub/sub bus carried by iroh-gossip topics.
pub struct GossipPubSub {
    gossip: Gossip,
    _router: Router,
    identity: ReplicaId,
    bootstrap: Vec<iroh::NodeId>,
    topics: Mutex<HashMap<String, Topic>>,
}

impl GossipPubSub {
    /// Start the gossip bus on an endpoint.
    ///
    /// `bootstrap` are the peers used to join each topic's swarm.
    pub fn spawn(endpoint: Endpoint, bootstrap: Vec<iroh::NodeId>) -> Self {
        let identity = ReplicaId::from(*endpoint.node_id().as_bytes());

        let gossip = Gossip::builder()
            .max_message_size(MAX_MESSAGE_SIZE)
            .spawn(endpoint.clone());

        let router = Router::builder(endpoint)
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        info!(identity = %identity, "gossip pub/sub started");

        Self {
            gossip,
            _router: router,
            identity,
            bootstrap,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// This peer's identity on the bus (its endpoint public key).
    pub fn identity(&self) -> ReplicaId {
        self.identity
    }

    /// Derive the topic for a channel name.
    fn topic_id(channel: &str) -> TopicId {
        TopicId::from_bytes(*blake3::hash(channel.as_bytes()).as_bytes())
    }

    /// Shut down the gossip layer and leave every topic.
    pub async fn shutdown(self) -> Result<(), PubSubError> {
        {
            let mut topics = self.topics.lock().await;
            for (channel, topic) in topics.drain() {
                debug!(channel, "leaving gossip topic");
                topic.task.abort();
            }
        }

        self.gossip
            .shutdown()
            .await
            .map_err(|e| PubSubError::Gossip(e.to_string()))?;
        self._router
            .shutdown()
            .await
            .map_err(|e| PubSubError::Gossip(e.to_string()))?;
        info!("gossip pub/sub shut down");
        Ok(())
    }
}

/// Pump gossip events into the per-topic fanout and neighbor set.
async fn run_receiver(
    channel: String,
    mut receiver: GossipReceiver,
    fanout: broadcast::Sender<Bytes>,
    neighbors: Arc<RwLock<HashSet<iroh::NodeId>>>,
) {
    while let Some(event) = receiver.next().await {
        match event {
            Ok(Event::Received(msg)) => {
                // No receivers is fine — delivery is best-effort.
                let _ = fanout.send(msg.content);
            }
            Ok(Event::NeighborUp(id)) => {
                debug!(channel, %id, "gossip neighbor up");
                neighbors.write().expect("lock poisoned").insert(id);
            }
            Ok(Event::NeighborDown(id)) => {
                debug!(channel, %id, "gossip neighbor down");
                neighbors.write().expect("lock poisoned").remove(&id);
            }
            Ok(Event::Lagged) => {
                warn!(channel, "gossip receiver lagged — a future announcement will catch us up");
            }
            Err(e) => {
                error!(channel, "gossip receiver error: {e}");
                break;
            }
        }
    }

    debug!(channel, "gossip receiver loop exited");
}

#[async_trait::async_trait]
impl PubSub for GossipPubSub {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, PubSubError> {
        let mut topics = self.topics.lock().await;

        if let Some(topic) = topics.get(channel) {
            return Ok(Subscription::new(topic.fanout.subscribe()));
        }

        let topic = self
            .gossip
            .subscribe_and_join(Self::topic_id(channel), self.bootstrap.clone())
            .await
            .map_err(|e| PubSubError::Gossip(e.to_string()))?;
        let (sender, receiver) = topic.split();

        let (fanout, rx) = broadcast::channel(TOPIC_CAPACITY);
        let neighbors = Arc::new(RwLock::new(HashSet::new()));
        let task = tokio::spawn(run_receiver(
            channel.to_string(),
            receiver,
            fanout.clone(),
            neighbors.clone(),
        ));

        debug!(channel, "joined gossip topic");
        topics.insert(
            channel.to_string(),
            Topic {
                sender,
                fanout,
                neighbors,
                task,
            },
        );

        Ok(Subscription::new(rx))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), PubSubError> {
        let mut topics = self.topics.lock().await;

        if let Some(topic) = topics.remove(channel) {
            topic.task.abort();
            debug!(channel, "left gossip topic");
        }

        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), PubSubError> {
        let topics = self.topics.lock().await;
        let topic = topics
            .get(channel)
            .ok_or_else(|| PubSubError::NotSubscribed(channel.to_string()))?;

        topic
            .sender
            .broadcast(payload)
            .await
            .map_err(|e: iroh_gossip::api::ApiError| PubSubError::Gossip(e.to_string()))
    }

    async fn peers(&self, channel: &str) -> Result<Vec<ReplicaId>, PubSubError> {
        let topics = self.topics.lock().await;
        Ok(topics
            .get(channel)
            .map(|topic| {
                topic
                    .neighbors
                    .read()
                    .expect("lock poisoned")
                    .iter()
                    .map(|id| ReplicaId::from(*id.as_bytes()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
