//! Node resources: worker hosts running a proxy runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// A worker host registered with the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeSpec,
    #[serde(default)]
    pub status: NodeStatus,
}

/// Desired configuration of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Shared secret for the node's own HTTP surface.
    #[serde(default)]
    pub token: String,
}

/// Observed state of a node, rewritten on every heartbeat and by the
/// node monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub capacity: NodeCapacity,
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    #[serde(default)]
    pub connection_config: ConnectionConfig,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<DateTime<Utc>>,
}

/// How many inbounds this node accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapacity {
    #[serde(default)]
    pub max_inbounds: u32,
}

/// How to dial the node's HTTP surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub port: u16,
}

/// Address classification; internal addresses are preferred for
/// control-plane dial-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeAddressType {
    InternalAddress,
    ExternalAddress,
}

/// A single reachable address of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub address_type: NodeAddressType,
    pub address: String,
}

/// The first address of the requested type, else the first address at
/// all. Nodes carry at least one address; an empty slice yields `None`.
#[must_use]
pub fn preferred_address(
    addresses: &[NodeAddress],
    address_type: NodeAddressType,
) -> Option<&str> {
    addresses
        .iter()
        .find(|addr| addr.address_type == address_type)
        .or_else(|| addresses.first())
        .map(|addr| addr.address.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(t: NodeAddressType, a: &str) -> NodeAddress {
        NodeAddress {
            address_type: t,
            address: a.to_owned(),
        }
    }

    #[test]
    fn preferred_address_picks_requested_type() {
        let addrs = vec![
            addr(NodeAddressType::ExternalAddress, "203.0.113.7"),
            addr(NodeAddressType::InternalAddress, "10.0.0.7"),
        ];
        assert_eq!(
            preferred_address(&addrs, NodeAddressType::InternalAddress),
            Some("10.0.0.7")
        );
    }

    #[test]
    fn preferred_address_falls_back_to_first() {
        let addrs = vec![addr(NodeAddressType::ExternalAddress, "203.0.113.7")];
        assert_eq!(
            preferred_address(&addrs, NodeAddressType::InternalAddress),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn preferred_address_empty_is_none() {
        assert_eq!(preferred_address(&[], NodeAddressType::InternalAddress), None);
    }
}
