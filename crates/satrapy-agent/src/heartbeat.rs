//! The heartbeat loop.
//!
//! Owns the node status built at startup and republishes it on a fixed
//! cadence with a fresh `last_heartbeat_time`. A failed publish is
//! logged and retried on the next tick — a control-plane outage must
//! never take the agent down with it. Readiness is re-asserted on every
//! beat, which is also how a node demoted by the monitor comes back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use satrapy_client::Client;
use satrapy_core::meta::now_second;
use satrapy_core::node::NodeStatus;
use satrapy_core::Error;

/// Publishes node status on a fixed cadence.
pub struct HeartbeatManager {
    client: Arc<Client>,
    node_name: String,
    frequency: Duration,
    status: NodeStatus,
}

/// Resolves once `shutdown` carries `true` or its sender is dropped.
///
/// Equivalent to `shutdown.wait_for(|stop| *stop)` but never holds the
/// channel's `Ref` guard across an `.await`, which is required for the
/// returned future to stay `Send` when spawned.
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

impl HeartbeatManager {
    #[must_use]
    pub fn new(
        client: Arc<Client>,
        node_name: String,
        frequency: Duration,
        status: NodeStatus,
    ) -> Self {
        Self {
            client,
            node_name,
            frequency,
            status,
        }
    }

    /// Stamp the status and publish it once.
    pub async fn beat(&mut self) -> Result<(), Error> {
        self.status.last_heartbeat_time = Some(now_second());
        self.client
            .update_node_status(&self.node_name, &self.status)
            .await
    }

    /// Beat until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.frequency);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(component = "heartbeatManager", node = %self.node_name, "started");

        loop {
            tokio::select! {
                _ = wait_for_stop(&mut shutdown) => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.beat().await {
                        error!(component = "heartbeatManager", resource = "node",
                            action = "heartbeat", node = %self.node_name, error = %e, "failed");
                    }
                }
            }
        }

        info!(component = "heartbeatManager", node = %self.node_name, "stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use satrapy_core::meta::ObjectMeta;
    use satrapy_core::node::Node;
    use satrapy_server::routes;
    use satrapy_server::state::AppState;
    use satrapy_storage::MemoryStore;
    use tokio::sync::watch;

    const TOKEN: &str = "test-token";

    async fn spawn_apiserver() -> Arc<Client> {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store, TOKEN.to_owned());
        let app = routes::router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Arc::new(
            Client::new(&format!("http://{addr}"), TOKEN, Duration::from_secs(5)).unwrap(),
        )
    }

    async fn seed_node(client: &Client) {
        client
            .create_node(&Node {
                metadata: ObjectMeta {
                    name: "n1".to_owned(),
                    ..ObjectMeta::default()
                },
                ..Node::default()
            })
            .await
            .unwrap();
    }

    fn status() -> NodeStatus {
        NodeStatus {
            ready: true,
            ..NodeStatus::default()
        }
    }

    #[tokio::test]
    async fn beat_publishes_a_fresh_timestamp() {
        let client = spawn_apiserver().await;
        seed_node(&client).await;

        let mut heartbeat = HeartbeatManager::new(
            client.clone(),
            "n1".to_owned(),
            Duration::from_secs(10),
            status(),
        );

        let before = now_second();
        heartbeat.beat().await.unwrap();

        let node = client.get_node("n1").await.unwrap();
        assert!(node.status.ready);
        let last = node.status.last_heartbeat_time.unwrap();
        assert!((last - before).num_seconds().abs() <= 2);
    }

    #[tokio::test]
    async fn beat_against_unknown_node_is_an_error_not_a_panic() {
        let client = spawn_apiserver().await;
        let mut heartbeat = HeartbeatManager::new(
            client,
            "ghost".to_owned(),
            Duration::from_secs(10),
            status(),
        );
        assert!(heartbeat.beat().await.is_err());
    }

    #[tokio::test]
    async fn run_beats_until_shutdown() {
        let client = spawn_apiserver().await;
        seed_node(&client).await;

        let mut heartbeat = HeartbeatManager::new(
            client.clone(),
            "n1".to_owned(),
            Duration::from_millis(50),
            status(),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { heartbeat.run(rx).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let node = client.get_node("n1").await.unwrap();
        assert!(node.status.last_heartbeat_time.is_some());
    }
}
