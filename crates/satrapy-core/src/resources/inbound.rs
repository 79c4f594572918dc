//! Inbound and inbound-user resource store.
//!
//! Inbounds and users are written with a lease equal to their own
//! `spec.ttl` — re-creating an object therefore renews its lease, which
//! is what makes metadata updates double as renewals.

use std::sync::Arc;

use tracing::error;

use satrapy_storage::Store;

use crate::error::{from_storage, Error};
use crate::proxy::{Inbound, InboundUser};
use crate::resources::{inbound_key, inbounds_prefix, user_key, users_prefix};

/// Key layout and serialisation for inbounds and their users.
pub struct InboundStore {
    store: Arc<dyn Store>,
}

impl InboundStore {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // ── Inbounds ─────────────────────────────────────────────────────

    pub async fn get_inbound(&self, node: &str, tag: &str) -> Result<Inbound, Error> {
        let bytes = self
            .store
            .get(&inbound_key(node, tag))
            .await
            .map_err(|e| {
                from_storage(e, Error::inbound_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
            })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::unmarshal_failed(e)
                .with_field("node", node)
                .with_field("tag", tag)
        })
    }

    pub async fn create_inbound(&self, node: &str, inbound: &Inbound) -> Result<(), Error> {
        let tag = &inbound.spec.config.tag;
        let bytes = serde_json::to_vec(inbound).map_err(|e| {
            Error::marshal_failed(e)
                .with_field("node", node)
                .with_field("tag", tag)
        })?;

        self.store
            .create(&inbound_key(node, tag), &bytes, inbound.spec.ttl_secs)
            .await
            .map_err(|e| {
                from_storage(e, Error::inbound_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
            })
    }

    pub async fn delete_inbound(&self, node: &str, tag: &str) -> Result<(), Error> {
        self.store
            .delete(&inbound_key(node, tag))
            .await
            .map_err(|e| {
                from_storage(e, Error::inbound_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
            })
    }

    pub async fn get_inbounds(&self, node: &str) -> Result<Vec<Inbound>, Error> {
        let rows = self
            .store
            .get_list(&inbounds_prefix(node))
            .await
            .map_err(|e| from_storage(e, Error::inbound_not_found).with_field("node", node))?;

        let mut inbounds = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_slice::<Inbound>(&row) {
                Ok(inbound) => inbounds.push(inbound),
                Err(e) => {
                    error!(resource = "inbound", node, error = %e, "unmarshal failed, skipping record");
                }
            }
        }
        Ok(inbounds)
    }

    pub async fn count_inbounds(&self, node: &str) -> Result<u32, Error> {
        self.store
            .count(&inbounds_prefix(node))
            .await
            .map_err(|e| from_storage(e, Error::inbound_not_found).with_field("node", node))
    }

    // ── Users ────────────────────────────────────────────────────────

    pub async fn get_user(&self, node: &str, tag: &str, email: &str) -> Result<InboundUser, Error> {
        let bytes = self
            .store
            .get(&user_key(node, tag, email))
            .await
            .map_err(|e| {
                from_storage(e, Error::user_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
                    .with_field("email", email)
            })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            Error::unmarshal_failed(e)
                .with_field("node", node)
                .with_field("tag", tag)
                .with_field("email", email)
        })
    }

    pub async fn create_user(&self, node: &str, tag: &str, user: &InboundUser) -> Result<(), Error> {
        let email = &user.spec.email;
        let bytes = serde_json::to_vec(user).map_err(|e| {
            Error::marshal_failed(e)
                .with_field("node", node)
                .with_field("tag", tag)
                .with_field("email", email)
        })?;

        self.store
            .create(&user_key(node, tag, email), &bytes, user.spec.ttl_secs)
            .await
            .map_err(|e| {
                from_storage(e, Error::user_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
                    .with_field("email", email)
            })
    }

    pub async fn delete_user(&self, node: &str, tag: &str, email: &str) -> Result<(), Error> {
        self.store
            .delete(&user_key(node, tag, email))
            .await
            .map_err(|e| {
                from_storage(e, Error::user_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
                    .with_field("email", email)
            })
    }

    /// Prefix-delete every user under `(node, tag)`; the cascade half of
    /// inbound deletion.
    pub async fn delete_users(&self, node: &str, tag: &str) -> Result<(), Error> {
        self.store
            .delete(&users_prefix(node, tag))
            .await
            .map_err(|e| {
                from_storage(e, Error::user_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
            })
    }

    pub async fn get_users(&self, node: &str, tag: &str) -> Result<Vec<InboundUser>, Error> {
        let rows = self
            .store
            .get_list(&users_prefix(node, tag))
            .await
            .map_err(|e| {
                from_storage(e, Error::user_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
            })?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_slice::<InboundUser>(&row) {
                Ok(user) => users.push(user),
                Err(e) => {
                    error!(resource = "user", node, tag, error = %e, "unmarshal failed, skipping record");
                }
            }
        }
        Ok(users)
    }

    pub async fn count_users(&self, node: &str, tag: &str) -> Result<u32, Error> {
        self.store
            .count(&users_prefix(node, tag))
            .await
            .map_err(|e| {
                from_storage(e, Error::user_not_found)
                    .with_field("node", node)
                    .with_field("tag", tag)
            })
    }
}
