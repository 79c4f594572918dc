//! Agent configuration.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use satrapy_core::node::{ConnectionConfig, NodeAddress};

/// Top-level satrap configuration, loaded from YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SatrapConfig {
    /// Node name; defaults to the system hostname.
    #[serde(default)]
    pub node_name: String,
    /// Listen address for the agent's own HTTP surface.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-node token protecting the agent's HTTP surface.
    pub token: String,
    /// Whether to self-register with the apiserver on boot.
    #[serde(default)]
    pub register_node: bool,
    /// Extra labels merged over the generated hostname/os/arch set.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Addresses advertised in the node status; at least one.
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    #[serde(default)]
    pub max_inbounds: u32,
    /// How the control plane should dial this agent's HTTP surface.
    #[serde(default = "default_connection")]
    pub connection: ConnectionConfig,
    pub cluster: ClusterConfig,
    pub xray: XrayConfig,
    #[serde(default = "default_status_frequency")]
    pub node_status_update_frequency_secs: u64,
    #[serde(default = "default_sync_frequency")]
    pub sync_frequency_secs: u64,
    #[serde(default = "default_inbound_syncs")]
    pub concurrent_inbound_syncs: usize,
    #[serde(default = "default_gc_syncs")]
    pub concurrent_inbound_gc_syncs: usize,
    #[serde(default = "default_user_syncs")]
    pub concurrent_user_syncs: usize,
    #[serde(default = "default_gc_syncs")]
    pub concurrent_user_gc_syncs: usize,
}

/// How to reach the apiserver.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub server: String,
    pub token: String,
}

/// Where the local Xray gRPC API listens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrayConfig {
    pub address: String,
    pub port: u16,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    6441
}

fn default_connection() -> ConnectionConfig {
    ConnectionConfig {
        scheme: "http".to_owned(),
        port: default_port(),
    }
}

fn default_status_frequency() -> u64 {
    10
}

fn default_sync_frequency() -> u64 {
    10
}

fn default_inbound_syncs() -> usize {
    4
}

fn default_user_syncs() -> usize {
    4
}

fn default_gc_syncs() -> usize {
    2
}

impl SatrapConfig {
    /// Read and parse the YAML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// The configured node name, else the system hostname.
    #[must_use]
    pub fn node_name(&self) -> Option<String> {
        if !self.node_name.is_empty() {
            return Some(self.node_name.clone());
        }
        hostname()
    }

    /// The socket address for the agent's HTTP surface.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// The system hostname.
#[cfg(unix)]
#[must_use]
pub fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: gethostname writes at most `buf.len()` bytes into the
    // buffer we own and NUL-terminates it on success.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).into_owned();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
#[must_use]
pub fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
token: node-secret
cluster:
  server: http://127.0.0.1:6440
  token: cluster-secret
xray:
  address: 127.0.0.1
  port: 10085
";

    #[test]
    fn parses_minimal_yaml_with_defaults() {
        let cfg: SatrapConfig = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.port, 6441);
        assert_eq!(cfg.sync_frequency_secs, 10);
        assert_eq!(cfg.concurrent_inbound_syncs, 4);
        assert_eq!(cfg.concurrent_inbound_gc_syncs, 2);
        assert!(!cfg.register_node);
    }

    #[test]
    fn node_name_falls_back_to_hostname() {
        let cfg: SatrapConfig = serde_yaml::from_str(MINIMAL).unwrap();
        // Not asserting the value — just that the fallback path resolves
        // on the build host.
        assert!(cfg.node_name().is_some());
    }
}
