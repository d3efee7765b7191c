//! Environment configuration.
//!
//! The operational contract: `DATA_DIR` (default `./data`), `NODE_ID`
//! (required, numeric), `BIND_ADDR` (default `127.0.0.1`), `RAFT_PORT`
//! (default `10000`), `HTTP_PORT` (default `8080`), and `PEERS`
//! (comma-separated; empty means bootstrap a single-node cluster).

use std::path::PathBuf;

use thiserror::Error;

use crate::raft::{Node, NodeId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("NODE_ID must be set")]
    MissingNodeId,
    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub node_id: NodeId,
    pub bind_addr: String,
    pub raft_port: u16,
    pub http_port: u16,
    pub peers: Vec<String>,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_id = std::env::var("NODE_ID").map_err(|_| ConfigError::MissingNodeId)?;
        let node_id = node_id.parse().map_err(|_| ConfigError::Invalid {
            name: "NODE_ID",
            value: node_id.clone(),
        })?;

        let data_dir = std::env::var("DATA_DIR")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());

        let raft_port = port_from_env("RAFT_PORT", 10000)?;
        let http_port = port_from_env("HTTP_PORT", 8080)?;

        let peers = std::env::var("PEERS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            data_dir,
            node_id,
            bind_addr,
            raft_port,
            http_port,
            peers,
        })
    }

    /// An empty peer set means this node bootstraps the cluster alone.
    pub fn bootstrap(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn node(&self) -> Node {
        Node::new(&self.bind_addr, self.raft_port, self.http_port)
    }

    pub fn raft_listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.raft_port)
    }

    pub fn http_listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.http_port)
    }
}

fn port_from_env(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
