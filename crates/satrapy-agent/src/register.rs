//! First-boot node registration.
//!
//! A blocking one-shot that posts the agent's node object to the
//! apiserver, retrying with exponential backoff until it lands or the
//! agent shuts down. Upsert semantics on the server make
//! re-registration after a restart safe: identity is preserved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use satrapy_client::Client;
use satrapy_core::node::Node;
use satrapy_core::{Error, ErrorKind, ErrorReason};

/// Initial backoff step.
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(7);

/// Registers the node with the apiserver.
pub struct RegisterManager {
    client: Arc<Client>,
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

impl RegisterManager {
    #[must_use]
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Post `node` until it succeeds. Backoff starts at 100 ms and
    /// doubles up to 7 s between attempts. Returns the stored node on
    /// success, or an error when shutdown interrupts the wait.
    pub async fn register(
        &self,
        mut shutdown: watch::Receiver<bool>,
        node: &Node,
    ) -> Result<Node, Error> {
        let mut step = INITIAL_BACKOFF;

        loop {
            tokio::select! {
                _ = wait_for_stop(&mut shutdown) => {
                    return Err(Error::new(
                        ErrorKind::Internal,
                        ErrorReason::Unknown,
                        "registration cancelled",
                    ));
                }
                () = tokio::time::sleep(step) => {
                    step = (step * 2).min(MAX_BACKOFF);

                    info!(component = "registerManager", node = %node.metadata.name,
                        "attempting to register node");
                    match self.client.create_node(node).await {
                        Ok(stored) => {
                            info!(component = "registerManager", node = %stored.metadata.name,
                                uid = %stored.metadata.uid, "successfully registered node");
                            return Ok(stored);
                        }
                        Err(e) => {
                            warn!(component = "registerManager", node = %node.metadata.name,
                                error = %e, backoff_ms = step.as_millis() as u64, "retrying");
                        }
                    }
                }
            }
        }
    }
}
