//! apiserver configuration.
//!
//! Loaded from a YAML file passed via `--config`. Field names are
//! camelCase to match the wire format of the objects the server stores.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Top-level apiserver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfig {
    /// Listen address, default `0.0.0.0`.
    #[serde(default = "default_address")]
    pub address: IpAddr,
    /// Listen port, default `6440`.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Cluster-wide shared token for HMAC verification.
    pub token: String,
    pub etcd: EtcdConfig,
}

/// etcd connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    6440
}

impl ApiServerConfig {
    /// Read and parse the YAML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// The socket address to bind.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
