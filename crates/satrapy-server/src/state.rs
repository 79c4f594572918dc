//! Shared application state.

use std::sync::Arc;

use satrapy_core::service::{InboundService, NodeService};
use satrapy_storage::Store;

/// Shared state passed to every handler via `Arc`.
pub struct AppState {
    pub nodes: Arc<NodeService>,
    pub inbounds: Arc<InboundService>,
    /// Kept for the readiness probe only; data access goes through the
    /// services.
    pub store: Arc<dyn Store>,
    /// Cluster-wide token for HMAC verification.
    pub token: String,
}

impl AppState {
    /// Wire up services over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, token: String) -> Arc<Self> {
        let nodes = Arc::new(NodeService::new(satrapy_core::resources::NodeStore::new(
            store.clone(),
        )));
        let inbounds = Arc::new(InboundService::new(
            satrapy_core::resources::InboundStore::new(store.clone()),
            nodes.clone(),
        ));
        Arc::new(Self {
            nodes,
            inbounds,
            store,
            token,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
