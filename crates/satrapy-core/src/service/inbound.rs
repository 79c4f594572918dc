//! Inbound service.
//!
//! Owns the rules the stores don't: conflict on duplicate keys, capacity
//! enforcement against the parent's declared limits, cascading deletion
//! of users with their inbound, and identity preservation across
//! updates. Re-creating an object on update also renews its lease.

use std::sync::Arc;

use crate::error::Error;
use crate::meta::ObjectMeta;
use crate::proxy::{Inbound, InboundSpec, InboundUser, InboundUserSpec};
use crate::resources::InboundStore;
use crate::service::NodeService;

/// Orchestrates inbound and inbound-user lifecycle.
pub struct InboundService {
    store: InboundStore,
    nodes: Arc<NodeService>,
}

impl InboundService {
    #[must_use]
    pub fn new(store: InboundStore, nodes: Arc<NodeService>) -> Self {
        Self { store, nodes }
    }

    // ── Inbounds ─────────────────────────────────────────────────────

    /// Create an inbound under a node.
    ///
    /// The node must exist, its `max_inbounds` capacity must not be
    /// reached, and the `(node, tag)` key must be free. Identity is
    /// assigned here; the stored object is returned.
    pub async fn create_inbound(&self, node: &str, mut inbound: Inbound) -> Result<Inbound, Error> {
        if node.is_empty() {
            return Err(Error::invalid_node());
        }
        let tag = inbound.spec.config.tag.clone();
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }

        let owner = self.nodes.get_node(node).await?;
        let count = self.store.count_inbounds(node).await?;
        if count >= owner.status.capacity.max_inbounds {
            return Err(Error::node_capacity_exceeded()
                .with_field("node", node)
                .with_field("tag", &tag));
        }

        match self.store.get_inbound(node, &tag).await {
            Ok(_) => {
                return Err(Error::inbound_conflict()
                    .with_field("node", node)
                    .with_field("tag", &tag));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if inbound.metadata.name.is_empty() {
            inbound.metadata.name.clone_from(&tag);
        }
        inbound.metadata.assign_identity();

        self.store.create_inbound(node, &inbound).await?;
        Ok(inbound)
    }

    pub async fn get_inbound(&self, node: &str, tag: &str) -> Result<Inbound, Error> {
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }
        self.store.get_inbound(node, tag).await
    }

    pub async fn get_inbounds(&self, node: &str) -> Result<Vec<Inbound>, Error> {
        self.store.get_inbounds(node).await
    }

    pub async fn count_inbounds(&self, node: &str) -> Result<u32, Error> {
        self.store.count_inbounds(node).await
    }

    /// Cascade delete: best-effort removal of every child user, then the
    /// inbound row itself. An inbound whose users already expired must
    /// still delete cleanly, so a missing user prefix is tolerated.
    pub async fn delete_inbound(&self, node: &str, tag: &str) -> Result<(), Error> {
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }

        match self.store.delete_users(node, tag).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.store.delete_inbound(node, tag).await
    }

    /// Replace the metadata sub-object, preserving identity. The re-put
    /// renews the inbound's lease.
    pub async fn update_inbound_metadata(
        &self,
        node: &str,
        tag: &str,
        mut metadata: ObjectMeta,
    ) -> Result<(), Error> {
        let mut inbound = self.get_inbound(node, tag).await?;
        metadata.preserve_identity(&inbound.metadata);
        inbound.metadata = metadata;
        self.store.create_inbound(node, &inbound).await
    }

    /// Replace the spec sub-object. The tag is the storage key and is
    /// kept; the re-put renews the lease with the incoming `ttl`.
    pub async fn update_inbound_spec(
        &self,
        node: &str,
        tag: &str,
        mut spec: InboundSpec,
    ) -> Result<(), Error> {
        let mut inbound = self.get_inbound(node, tag).await?;
        spec.config.tag.clone_from(&inbound.spec.config.tag);
        inbound.spec = spec;
        self.store.create_inbound(node, &inbound).await
    }

    // ── Users ────────────────────────────────────────────────────────

    /// Create a user under an inbound.
    ///
    /// The parent inbound must exist, its `max_users` capacity must not
    /// be reached, and the `(node, tag, email)` key must be free.
    pub async fn create_user(
        &self,
        node: &str,
        tag: &str,
        mut user: InboundUser,
    ) -> Result<InboundUser, Error> {
        if tag.is_empty() {
            return Err(Error::invalid_inbound());
        }
        let email = user.spec.email.clone();
        if email.is_empty() {
            return Err(Error::invalid_user());
        }

        let parent = self.store.get_inbound(node, tag).await?;
        let count = self.store.count_users(node, tag).await?;
        if count >= parent.spec.capacity.max_users {
            return Err(Error::inbound_capacity_exceeded()
                .with_field("node", node)
                .with_field("tag", tag));
        }

        match self.store.get_user(node, tag, &email).await {
            Ok(_) => {
                return Err(Error::user_conflict()
                    .with_field("node", node)
                    .with_field("tag", tag)
                    .with_field("email", &email));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        user.spec.inbound_tag = tag.to_owned();
        if user.metadata.name.is_empty() {
            user.metadata.name.clone_from(&email);
        }
        user.metadata.assign_identity();

        self.store.create_user(node, tag, &user).await?;
        Ok(user)
    }

    pub async fn get_user(&self, node: &str, tag: &str, email: &str) -> Result<InboundUser, Error> {
        if email.is_empty() {
            return Err(Error::invalid_user());
        }
        self.store.get_user(node, tag, email).await
    }

    pub async fn get_users(&self, node: &str, tag: &str) -> Result<Vec<InboundUser>, Error> {
        self.store.get_users(node, tag).await
    }

    pub async fn count_users(&self, node: &str, tag: &str) -> Result<u32, Error> {
        self.store.count_users(node, tag).await
    }

    pub async fn delete_user(&self, node: &str, tag: &str, email: &str) -> Result<(), Error> {
        if email.is_empty() {
            return Err(Error::invalid_user());
        }
        self.store.delete_user(node, tag, email).await
    }

    /// Replace the user's metadata, preserving identity; renews the
    /// lease.
    pub async fn update_user_metadata(
        &self,
        node: &str,
        tag: &str,
        email: &str,
        mut metadata: ObjectMeta,
    ) -> Result<(), Error> {
        let mut user = self.get_user(node, tag, email).await?;
        metadata.preserve_identity(&user.metadata);
        user.metadata = metadata;
        self.store.create_user(node, tag, &user).await
    }

    /// Replace the user's spec. The identity tuple — protocol, inbound
    /// tag, email, and the credential blob — is kept from the stored
    /// object; only the mutable remainder (the ttl) is taken from the
    /// incoming spec.
    pub async fn update_user_spec(
        &self,
        node: &str,
        tag: &str,
        email: &str,
        spec: InboundUserSpec,
    ) -> Result<(), Error> {
        let mut user = self.get_user(node, tag, email).await?;
        user.spec.ttl_secs = spec.ttl_secs;
        self.store.create_user(node, tag, &user).await
    }
}
