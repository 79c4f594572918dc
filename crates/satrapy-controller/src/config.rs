//! Controller configuration.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Top-level spasaka configuration, loaded from YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpasakaConfig {
    pub cluster: ClusterConfig,
    pub etcd: EtcdConfig,
    /// Skip leader election entirely; for single-controller
    /// deployments.
    #[serde(default)]
    pub single_node: bool,
    #[serde(default = "default_node_syncs")]
    pub concurrent_node_syncs: usize,
    #[serde(default = "default_monitor_period")]
    pub node_monitor_period_secs: u64,
    #[serde(default = "default_grace_period")]
    pub node_monitor_grace_period_secs: u64,
}

/// How to reach the apiserver.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub server: String,
    pub token: String,
}

/// etcd connection settings for the election primitive.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdConfig {
    #[serde(default)]
    pub endpoints: Vec<String>,
}

fn default_node_syncs() -> usize {
    4
}

fn default_monitor_period() -> u64 {
    10
}

fn default_grace_period() -> u64 {
    40
}

impl SpasakaConfig {
    /// Read and parse the YAML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml_with_defaults() {
        let cfg: SpasakaConfig = serde_yaml::from_str(
            "cluster:\n  server: http://127.0.0.1:6440\n  token: t\netcd:\n  endpoints: []\nsingleNode: true\n",
        )
        .unwrap();
        assert!(cfg.single_node);
        assert_eq!(cfg.node_monitor_period_secs, 10);
        assert_eq!(cfg.node_monitor_grace_period_secs, 40);
        assert_eq!(cfg.concurrent_node_syncs, 4);
    }
}
