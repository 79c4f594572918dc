//! Typed resource stores.
//!
//! Thin wrappers over the storage port. Each store owns its key layout,
//! JSON (de)serialisation, and the mapping of opaque storage errors onto
//! the domain taxonomy. Nothing here validates business rules — that is
//! the services' job.

mod inbound;
mod node;

pub use inbound::InboundStore;
pub use node::NodeStore;

pub(crate) fn node_key(name: &str) -> String {
    format!("/nodes/{name}")
}

pub(crate) fn nodes_prefix() -> &'static str {
    "/nodes/"
}

pub(crate) fn inbound_key(node: &str, tag: &str) -> String {
    format!("/inbounds/{node}/{tag}")
}

pub(crate) fn inbounds_prefix(node: &str) -> String {
    format!("/inbounds/{node}/")
}

pub(crate) fn user_key(node: &str, tag: &str, email: &str) -> String {
    format!("/inboundUsers/{node}/{tag}/{email}")
}

pub(crate) fn users_prefix(node: &str, tag: &str) -> String {
    format!("/inboundUsers/{node}/{tag}/")
}
