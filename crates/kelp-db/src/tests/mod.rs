//! Tests for the database layer.
//!
//! Peers in these tests share one [`MemoryHub`] (the network) and one
//! [`MemoryObjectStore`] (the content-addressed store any peer can fetch
//! from), while each has its own keystore and cache — the same shape a
//! real deployment has, minus the wire.

mod manager_tests;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kelp_keystore::Keystore;
use kelp_pubsub::{MemoryHub, MemoryPubSub};
use kelp_store::{Cache, MemoryObjectStore, ObjectStore};

use crate::manager::{KelpConfig, KelpDb};

/// A short settle delay keeps replication tests fast.
const TEST_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// The shared fabric of a simulated network.
struct TestNet {
    hub: Arc<MemoryHub>,
    objects: Arc<MemoryObjectStore>,
}

impl TestNet {
    fn new() -> Self {
        // Opt-in log output: `RUST_LOG=debug cargo test -- --nocapture`.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        Self {
            hub: MemoryHub::new(),
            objects: Arc::new(MemoryObjectStore::new()),
        }
    }

    /// Attach a fresh peer: its own keystore and cache, shared object
    /// store and pub/sub hub.
    fn peer(&self) -> KelpDb {
        let keystore = Arc::new(Keystore::in_memory());
        let identity = keystore.create_key("self").unwrap();

        KelpDb::new(
            self.objects.clone() as Arc<dyn ObjectStore>,
            keystore,
            Arc::new(MemoryPubSub::new(self.hub.clone(), identity)),
            Cache::in_memory(),
            KelpConfig {
                settle_delay: TEST_SETTLE_DELAY,
                ..KelpConfig::default()
            },
        )
        .unwrap()
    }
}

/// Poll `probe` until it returns true or the deadline passes.
async fn wait_until<F, Fut>(what: &str, timeout: Duration, probe: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if probe().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
