//! Node endpoints.

use reqwest::Method;

use satrapy_core::meta::ObjectMeta;
use satrapy_core::node::{Node, NodeSpec, NodeStatus};
use satrapy_core::Error;

use crate::{Client, Flavor};

impl Client {
    /// Upsert a node; the response carries the server-assigned identity.
    pub async fn create_node(&self, node: &Node) -> Result<Node, Error> {
        self.send_json(Method::POST, "/api/v1/nodes", Some(node), Flavor::Node)
            .await
    }

    pub async fn get_node(&self, name: &str) -> Result<Node, Error> {
        if name.is_empty() {
            return Err(Error::invalid_node());
        }
        self.send_json::<(), _>(
            Method::GET,
            &format!("/api/v1/nodes/{name}"),
            None,
            Flavor::Node,
        )
        .await
    }

    pub async fn get_nodes(&self) -> Result<Vec<Node>, Error> {
        self.send_json::<(), _>(Method::GET, "/api/v1/nodes", None, Flavor::Node)
            .await
    }

    /// Nodes currently marked ready.
    pub async fn get_active_nodes(&self) -> Result<Vec<Node>, Error> {
        self.send_json::<(), _>(Method::GET, "/api/v1/nodes/active", None, Flavor::Node)
            .await
    }

    pub async fn delete_node(&self, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::invalid_node());
        }
        self.send::<()>(
            Method::DELETE,
            &format!("/api/v1/nodes/{name}"),
            None,
            Flavor::Node,
        )
        .await
        .map(|_| ())
    }

    pub async fn update_node_status(&self, name: &str, status: &NodeStatus) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::invalid_node());
        }
        self.send(
            Method::PATCH,
            &format!("/api/v1/nodes/{name}/status"),
            Some(status),
            Flavor::Node,
        )
        .await
        .map(|_| ())
    }

    pub async fn update_node_metadata(
        &self,
        name: &str,
        metadata: &ObjectMeta,
    ) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::invalid_node());
        }
        self.send(
            Method::PATCH,
            &format!("/api/v1/nodes/{name}/metadata"),
            Some(metadata),
            Flavor::Node,
        )
        .await
        .map(|_| ())
    }

    pub async fn update_node_spec(&self, name: &str, spec: &NodeSpec) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::invalid_node());
        }
        self.send(
            Method::PATCH,
            &format!("/api/v1/nodes/{name}/spec"),
            Some(spec),
            Flavor::Node,
        )
        .await
        .map(|_| ())
    }
}
