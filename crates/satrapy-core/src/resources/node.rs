//! Node resource store.

use std::sync::Arc;

use tracing::error;

use satrapy_storage::Store;

use crate::error::{from_storage, Error};
use crate::node::Node;
use crate::resources::{node_key, nodes_prefix};

/// Key layout and serialisation for nodes. Nodes are never leased.
pub struct NodeStore {
    store: Arc<dyn Store>,
}

impl NodeStore {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_node(&self, name: &str) -> Result<Node, Error> {
        let bytes = self
            .store
            .get(&node_key(name))
            .await
            .map_err(|e| from_storage(e, Error::node_not_found).with_field("node", name))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| Error::unmarshal_failed(e).with_field("node", name))
    }

    pub async fn create_node(&self, node: &Node) -> Result<(), Error> {
        let name = &node.metadata.name;
        let bytes = serde_json::to_vec(node)
            .map_err(|e| Error::marshal_failed(e).with_field("node", name))?;

        self.store
            .create(&node_key(name), &bytes, 0)
            .await
            .map_err(|e| from_storage(e, Error::node_not_found).with_field("node", name))
    }

    pub async fn delete_node(&self, name: &str) -> Result<(), Error> {
        self.store
            .delete(&node_key(name))
            .await
            .map_err(|e| from_storage(e, Error::node_not_found).with_field("node", name))
    }

    /// List every node. A record that fails to decode is logged and
    /// skipped so one corrupt row cannot poison the whole list.
    pub async fn get_nodes(&self) -> Result<Vec<Node>, Error> {
        let rows = self
            .store
            .get_list(nodes_prefix())
            .await
            .map_err(|e| from_storage(e, Error::node_not_found))?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_slice::<Node>(&row) {
                Ok(node) => nodes.push(node),
                Err(e) => error!(resource = "node", error = %e, "unmarshal failed, skipping record"),
            }
        }
        Ok(nodes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::meta::ObjectMeta;
    use satrapy_storage::MemoryStore;

    fn store() -> (NodeStore, Arc<MemoryStore>) {
        let backing = Arc::new(MemoryStore::new());
        (NodeStore::new(backing.clone()), backing)
    }

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: name.to_owned(),
                ..ObjectMeta::default()
            },
            ..Node::default()
        }
    }

    #[tokio::test]
    async fn create_get_roundtrip() {
        let (nodes, _) = store();
        nodes.create_node(&node("n1")).await.unwrap();
        let got = nodes.get_node("n1").await.unwrap();
        assert_eq!(got.metadata.name, "n1");
    }

    #[tokio::test]
    async fn get_missing_is_node_not_found() {
        let (nodes, _) = store();
        let err = nodes.get_node("nope").await.unwrap_err();
        assert!(err.matches(&Error::node_not_found()));
    }

    #[tokio::test]
    async fn delete_missing_is_node_not_found() {
        let (nodes, _) = store();
        let err = nodes.delete_node("nope").await.unwrap_err();
        assert!(err.matches(&Error::node_not_found()));
    }

    #[tokio::test]
    async fn corrupt_record_is_skipped_in_list() {
        let (nodes, backing) = store();
        nodes.create_node(&node("n1")).await.unwrap();
        backing.create("/nodes/broken", b"{not json", 0).await.unwrap();
        nodes.create_node(&node("n2")).await.unwrap();

        let listed = nodes.get_nodes().await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
