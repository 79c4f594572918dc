//! The node liveness monitor.
//!
//! Each tick lists the active nodes and hands them to a bounded worker
//! pool. A worker demotes any node whose last heartbeat is strictly
//! older than the grace period; a node whose heartbeat lands exactly on
//! the boundary stays ready. There is no promote-back path here —
//! readiness is re-asserted only by the agent's next heartbeat. All
//! staleness decisions use this process's clock at read time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use satrapy_client::Client;
use satrapy_core::node::Node;

/// Buffer between the tick loop and the workers.
const CHANNEL_CAPACITY: usize = 64;

/// Demotes nodes with stale heartbeats.
pub struct NodeMonitor {
    client: Arc<Client>,
    period: Duration,
    grace: chrono::Duration,
    workers: usize,
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

impl NodeMonitor {
    #[must_use]
    pub fn new(client: Arc<Client>, period: Duration, grace_secs: u64, workers: usize) -> Self {
        Self {
            client,
            period,
            grace: chrono::Duration::seconds(i64::try_from(grace_secs).unwrap_or(i64::MAX)),
            workers,
        }
    }

    /// Run the monitor until shutdown, then drain the pool.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let pool = MonitorPool::spawn(self.client.clone(), self.grace, self.workers);

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(component = "nodeMonitor", "started");

        loop {
            tokio::select! {
                _ = wait_for_stop(&mut shutdown) => break,
                _ = ticker.tick() => self.tick(&pool).await,
            }
        }

        pool.shutdown().await;
        info!(component = "nodeMonitor", "stopped");
    }

    /// List active nodes and dispatch them to the workers.
    pub(crate) async fn tick(&self, pool: &MonitorPool) {
        let nodes = match self.client.get_active_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(component = "nodeMonitor", error = %e, "failed to list active nodes");
                return;
            }
        };

        info!(component = "nodeMonitor", count = nodes.len(), "retrieved");

        for node in nodes {
            let _ = pool.tx.send(node).await;
        }
    }
}

/// The dispatch channel and its worker pool.
pub(crate) struct MonitorPool {
    tx: mpsc::Sender<Node>,
    handles: Vec<JoinHandle<()>>,
}

impl MonitorPool {
    pub(crate) fn spawn(client: Arc<Client>, grace: chrono::Duration, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Node>(CHANNEL_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|_| tokio::spawn(monitor_worker(client.clone(), grace, rx.clone())))
            .collect();

        Self { tx, handles }
    }

    pub(crate) async fn shutdown(self) {
        drop(self.tx);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn monitor_worker(
    client: Arc<Client>,
    grace: chrono::Duration,
    rx: Arc<Mutex<mpsc::Receiver<Node>>>,
) {
    loop {
        let node = { rx.lock().await.recv().await };
        let Some(mut node) = node else { break };

        if !is_stale(&node, grace, Utc::now()) {
            continue;
        }

        let name = node.metadata.name.clone();
        node.status.ready = false;
        if let Err(e) = client.update_node_status(&name, &node.status).await {
            error!(component = "nodeMonitor", resource = "node", action = "demote",
                node = %name, error = %e, "failed");
            continue;
        }
        info!(component = "nodeMonitor", node = %name, "marked not ready");
    }
}

/// Whether the node's heartbeat is strictly older than `now - grace`.
/// A node that has never heartbeated at all is stale by definition.
pub(crate) fn is_stale(node: &Node, grace: chrono::Duration, now: DateTime<Utc>) -> bool {
    match node.status.last_heartbeat_time {
        Some(last) => now - last > grace,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satrapy_core::node::NodeStatus;

    fn node_with_heartbeat(last: Option<DateTime<Utc>>) -> Node {
        Node {
            status: NodeStatus {
                ready: true,
                last_heartbeat_time: last,
                ..NodeStatus::default()
            },
            ..Node::default()
        }
    }

    #[test]
    fn heartbeat_on_the_boundary_stays_ready() {
        let grace = chrono::Duration::seconds(40);
        let now = Utc::now();
        let node = node_with_heartbeat(Some(now - grace));
        assert!(!is_stale(&node, grace, now));
    }

    #[test]
    fn heartbeat_one_second_past_the_boundary_is_stale() {
        let grace = chrono::Duration::seconds(40);
        let now = Utc::now();
        let node = node_with_heartbeat(Some(now - grace - chrono::Duration::seconds(1)));
        assert!(is_stale(&node, grace, now));
    }

    #[test]
    fn fresh_heartbeat_is_not_stale() {
        let grace = chrono::Duration::seconds(40);
        let now = Utc::now();
        let node = node_with_heartbeat(Some(now));
        assert!(!is_stale(&node, grace, now));
    }

    #[test]
    fn missing_heartbeat_is_stale() {
        let grace = chrono::Duration::seconds(40);
        let node = node_with_heartbeat(None);
        assert!(is_stale(&node, grace, Utc::now()));
    }
}
