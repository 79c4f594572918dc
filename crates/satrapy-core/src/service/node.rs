//! Node service.

use crate::error::Error;
use crate::node::{Node, NodeSpec, NodeStatus};
use crate::meta::ObjectMeta;
use crate::resources::NodeStore;

/// Orchestrates node lifecycle over the node store.
pub struct NodeService {
    store: NodeStore,
}

impl NodeService {
    #[must_use]
    pub fn new(store: NodeStore) -> Self {
        Self { store }
    }

    /// Upsert with identity preservation: a node re-registered under an
    /// existing name keeps the `uid` and `creation_timestamp` assigned
    /// on its first create; a new name gets a fresh identity.
    ///
    /// Returns the stored object, identity included.
    pub async fn create_node(&self, mut node: Node) -> Result<Node, Error> {
        if node.metadata.name.is_empty() {
            return Err(Error::invalid_node());
        }

        match self.store.get_node(&node.metadata.name).await {
            Ok(existing) => node.metadata.preserve_identity(&existing.metadata),
            Err(e) if e.is_not_found() => node.metadata.assign_identity(),
            Err(e) => return Err(e),
        }

        self.store.create_node(&node).await?;
        Ok(node)
    }

    pub async fn get_node(&self, name: &str) -> Result<Node, Error> {
        if name.is_empty() {
            return Err(Error::invalid_node());
        }
        self.store.get_node(name).await
    }

    pub async fn delete_node(&self, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::invalid_node());
        }
        self.store.delete_node(name).await
    }

    pub async fn get_nodes(&self) -> Result<Vec<Node>, Error> {
        self.store.get_nodes().await
    }

    /// Nodes currently marked ready.
    pub async fn get_active_nodes(&self) -> Result<Vec<Node>, Error> {
        let mut nodes = self.store.get_nodes().await?;
        nodes.retain(|node| node.status.ready);
        Ok(nodes)
    }

    /// Replace the status sub-object; everything else is kept as stored.
    pub async fn update_status(&self, name: &str, status: NodeStatus) -> Result<(), Error> {
        let mut node = self.get_node(name).await?;
        node.status = status;
        self.store.create_node(&node).await
    }

    /// Replace the metadata sub-object, preserving `name`, `uid`, and
    /// `creation_timestamp`.
    pub async fn update_metadata(&self, name: &str, mut metadata: ObjectMeta) -> Result<(), Error> {
        let mut node = self.get_node(name).await?;
        metadata.preserve_identity(&node.metadata);
        node.metadata = metadata;
        self.store.create_node(&node).await
    }

    /// Replace the spec sub-object.
    pub async fn update_spec(&self, name: &str, spec: NodeSpec) -> Result<(), Error> {
        let mut node = self.get_node(name).await?;
        node.spec = spec;
        self.store.create_node(&node).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use satrapy_storage::MemoryStore;
    use std::sync::Arc;

    fn service() -> NodeService {
        NodeService::new(NodeStore::new(Arc::new(MemoryStore::new())))
    }

    fn node(name: &str, ready: bool) -> Node {
        Node {
            metadata: ObjectMeta {
                name: name.to_owned(),
                ..ObjectMeta::default()
            },
            status: NodeStatus {
                ready,
                ..NodeStatus::default()
            },
            ..Node::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_identity_once() {
        let svc = service();

        let first = svc.create_node(node("n1", true)).await.unwrap();
        assert!(!first.metadata.uid.is_empty());
        assert!(first.metadata.creation_timestamp.is_some());

        // Re-registration keeps the original identity.
        let second = svc.create_node(node("n1", true)).await.unwrap();
        assert_eq!(second.metadata.uid, first.metadata.uid);
        assert_eq!(
            second.metadata.creation_timestamp,
            first.metadata.creation_timestamp
        );
    }

    #[tokio::test]
    async fn create_rejects_empty_name() {
        let svc = service();
        let err = svc.create_node(Node::default()).await.unwrap_err();
        assert!(err.matches(&Error::invalid_node()));
    }

    #[tokio::test]
    async fn active_nodes_filters_on_ready() {
        let svc = service();
        svc.create_node(node("ready-1", true)).await.unwrap();
        svc.create_node(node("down-1", false)).await.unwrap();
        svc.create_node(node("ready-2", true)).await.unwrap();

        let active = svc.get_active_nodes().await.unwrap();
        let mut names: Vec<_> = active.iter().map(|n| n.metadata.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["ready-1", "ready-2"]);
    }

    #[tokio::test]
    async fn update_status_keeps_identity() {
        let svc = service();
        let created = svc.create_node(node("n1", true)).await.unwrap();

        svc.update_status(
            "n1",
            NodeStatus {
                ready: false,
                ..NodeStatus::default()
            },
        )
        .await
        .unwrap();

        let got = svc.get_node("n1").await.unwrap();
        assert!(!got.status.ready);
        assert_eq!(got.metadata.uid, created.metadata.uid);
    }

    #[tokio::test]
    async fn update_metadata_preserves_identity_fields() {
        let svc = service();
        let created = svc.create_node(node("n1", true)).await.unwrap();

        let mut incoming = ObjectMeta {
            name: "attempted-rename".to_owned(),
            uid: "attempted-uid".to_owned(),
            ..ObjectMeta::default()
        };
        incoming
            .labels
            .insert("region".to_owned(), "eu".to_owned());

        svc.update_metadata("n1", incoming).await.unwrap();

        let got = svc.get_node("n1").await.unwrap();
        assert_eq!(got.metadata.name, "n1");
        assert_eq!(got.metadata.uid, created.metadata.uid);
        assert_eq!(got.metadata.labels.get("region").map(String::as_str), Some("eu"));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let svc = service();
        svc.create_node(node("n1", true)).await.unwrap();
        svc.delete_node("n1").await.unwrap();
        let err = svc.get_node("n1").await.unwrap_err();
        assert!(err.matches(&Error::node_not_found()));
    }
}
