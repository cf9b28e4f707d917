use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, LedgerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique identifier of this node within the cluster.
    pub node_id: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_raft_dir")]
    pub raft_dir: PathBuf,
    #[serde(default = "default_raft_bind")]
    pub raft_bind: SocketAddr,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Replication addresses to contact when joining an existing cluster.
    #[serde(default)]
    pub raft_peers: Vec<String>,
    /// Form a single-node cluster when no prior replication state exists.
    #[serde(default)]
    pub raft_bootstrap: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_raft_dir() -> PathBuf {
    PathBuf::from("./raft")
}

fn default_raft_bind() -> SocketAddr {
    "127.0.0.1:7000".parse().expect("valid socket addr")
}

fn default_http_port() -> u16 {
    8080
}

impl NodeConfig {
    pub fn load(path: &Path) -> LedgerResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)
            .map_err(|err| LedgerError::InvalidArgument(format!("unable to parse config: {err}")))?;
        if config.node_id.is_empty() {
            return Err(LedgerError::InvalidArgument("node_id is required".into()));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> LedgerResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| LedgerError::Internal(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> LedgerResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.raft_dir)?;
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node1".to_string(),
            data_dir: default_data_dir(),
            raft_dir: default_raft_dir(),
            raft_bind: default_raft_bind(),
            http_port: default_http_port(),
            raft_peers: Vec::new(),
            raft_bootstrap: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.toml");
        let config = NodeConfig::default();
        config.save(&path).expect("save");
        let loaded = NodeConfig::load(&path).expect("load");
        assert_eq!(loaded.node_id, config.node_id);
        assert_eq!(loaded.raft_bind, config.raft_bind);
        assert_eq!(loaded.http_port, config.http_port);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.toml");
        fs::write(&path, "node_id = \"n2\"\n").expect("write");
        let config = NodeConfig::load(&path).expect("load");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.raft_dir, PathBuf::from("./raft"));
        assert_eq!(config.raft_bind.to_string(), "127.0.0.1:7000");
        assert_eq!(config.http_port, 8080);
        assert!(config.raft_peers.is_empty());
        assert!(!config.raft_bootstrap);
    }

    #[test]
    fn empty_node_id_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.toml");
        fs::write(&path, "node_id = \"\"\n").expect("write");
        assert!(matches!(
            NodeConfig::load(&path),
            Err(LedgerError::InvalidArgument(_))
        ));
    }
}
