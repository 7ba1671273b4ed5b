//! The replication coordinator: bridges a store and the pub/sub bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kelp_pubsub::{HeadsAnnounce, PubSub};
use kelp_types::ObjectId;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::DbError;
use crate::events::StoreEvent;
use crate::store::Store;

/// Per-subscription lifecycle. Only `Subscribed` sends or receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

/// One store's hookup to the pub/sub bus.
///
/// Outbound, local writes land in a watch channel so that consecutive
/// head sets coalesce — the bus only ever sees the newest frontier, which
/// is safe because heads grow monotonically. A single publisher task per
/// address keeps publishes ordered. Inbound announcements trigger a merge;
/// failures are logged and dropped, local state stays intact.
pub(crate) struct Replicator {
    channel: String,
    pubsub: Arc<dyn PubSub>,
    state: Arc<Mutex<SubscriptionState>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Replicator {
    /// Subscribe the store's address and start the coordinator tasks.
    ///
    /// After `settle_delay`, the current heads are announced once so that
    /// already-listening peers converge without waiting for the next
    /// local write.
    pub(crate) async fn spawn(
        store: Arc<Store>,
        pubsub: Arc<dyn PubSub>,
        settle_delay: Duration,
    ) -> Result<Self, DbError> {
        let channel = store.address().to_string();
        let state = Arc::new(Mutex::new(SubscriptionState::Subscribing));
        debug!(channel, "subscribing");

        let mut subscription = pubsub.subscribe(&channel).await?;
        *state.lock().expect("lock poisoned") = SubscriptionState::Subscribed;
        debug!(channel, "subscribed");

        let (heads_tx, mut heads_rx) = watch::channel(Vec::<ObjectId>::new());

        // Inbound: merge every announcement addressed to this database.
        let recv_task = {
            let channel = channel.clone();
            let store = store.clone();
            tokio::spawn(async move {
                while let Some(payload) = subscription.recv().await {
                    let announce = match HeadsAnnounce::decode(&payload) {
                        Ok(announce) => announce,
                        Err(e) => {
                            warn!(channel, "dropping undecodable announcement: {e}");
                            continue;
                        }
                    };

                    if announce.address != channel {
                        continue;
                    }

                    match store.merge_remote_heads(&announce.heads).await {
                        Ok(added) if added > 0 => {
                            debug!(channel, added, "merged announced heads");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(channel, "merge of announced heads failed: {e}");
                        }
                    }
                }
            })
        };

        // Forward local writes into the watch channel (coalescing).
        let forward_task = {
            let mut events = store.subscribe();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(StoreEvent::Write { heads, .. }) => {
                            let _ = heads_tx.send(heads);
                        }
                        Ok(StoreEvent::Closed { .. }) => break,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            // The next write carries a superseding frontier.
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        // Publisher: ready announce after the settle delay, then one
        // publish per observed frontier.
        let publish_task = {
            let channel = channel.clone();
            let pubsub = pubsub.clone();
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(settle_delay).await;

                let heads = store.heads().await;
                if !heads.is_empty() {
                    publish_heads(&*pubsub, &channel, heads, &state).await;
                }

                while heads_rx.changed().await.is_ok() {
                    let heads = heads_rx.borrow_and_update().clone();
                    publish_heads(&*pubsub, &channel, heads, &state).await;
                }
            })
        };

        Ok(Self {
            channel,
            pubsub,
            state,
            tasks: vec![recv_task, forward_task, publish_task],
        })
    }

    /// Walk the unsubscribe transition and stop the coordinator tasks.
    pub(crate) async fn stop(mut self) {
        *self.state.lock().expect("lock poisoned") = SubscriptionState::Unsubscribing;
        debug!(channel = %self.channel, "unsubscribing");

        for task in self.tasks.drain(..) {
            task.abort();
        }

        if let Err(e) = self.pubsub.unsubscribe(&self.channel).await {
            warn!(channel = %self.channel, "unsubscribe failed: {e}");
        }

        *self.state.lock().expect("lock poisoned") = SubscriptionState::Unsubscribed;
        debug!(channel = %self.channel, "unsubscribed");
    }
}

/// Publish one head announcement, unless the subscription is shutting
/// down. Transport failures are logged — the next announcement heals them.
async fn publish_heads(
    pubsub: &dyn PubSub,
    channel: &str,
    heads: Vec<ObjectId>,
    state: &Arc<Mutex<SubscriptionState>>,
) {
    if *state.lock().expect("lock poisoned") != SubscriptionState::Subscribed {
        return;
    }

    let announce = HeadsAnnounce::new(channel, heads);
    let payload = match announce.encode() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(channel, "failed to encode heads announcement: {e}");
            return;
        }
    };

    match pubsub.publish(channel, payload).await {
        Ok(()) => debug!(channel, heads = announce.heads.len(), "published heads"),
        Err(e) => warn!(channel, "publish failed, will retry on next write: {e}"),
    }
}
