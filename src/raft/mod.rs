//! Raft integration - consensus types, the node wrapper, durable log
//! storage, the replicated state machine, and the node-to-node transport.

use std::fmt;

use openraft::declare_raft_types;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod log_store;
pub mod network;
mod node;
mod snapshot;
mod state_machine;

#[cfg(test)]
mod tests;

pub use log_store::LogStore;
pub use node::RaftNode;
pub use snapshot::{SnapshotData, SnapshotStore};
pub use state_machine::StateMachine;

use crate::protocol::{Command, CommandResult};

pub type NodeId = u64;

/// Cluster member descriptor: one host carrying an internal raft RPC port
/// and the public HTTP API port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Node {
    pub addr: String,
    pub raft_port: u16,
    pub api_port: u16,
}

impl Node {
    pub fn new(addr: impl Into<String>, raft_port: u16, api_port: u16) -> Self {
        Self {
            addr: addr.into(),
            raft_port,
            api_port,
        }
    }

    /// Address the raft transport dials.
    pub fn raft_addr(&self) -> String {
        format!("{}:{}", self.addr, self.raft_port)
    }

    /// Address clients are redirected to.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.addr, self.api_port)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_addr())
    }
}

declare_raft_types!(
    pub TypeConfig:
        D = Command,
        R = CommandResult,
        Node = Node,
        SnapshotData = tokio::fs::File,
);

pub type StorageResult<T> = Result<T, openraft::StorageError<NodeId>>;
pub type LogId = openraft::LogId<NodeId>;

/// Failure modes of submitting a command through consensus.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("not the leader")]
    NotLeader { leader: Option<String> },
    #[error("timed out waiting for commit")]
    Timeout,
    #[error("consensus error: {0}")]
    Internal(String),
}

/// Failure modes of standing the raft node up.
#[derive(Debug, Error)]
pub enum RaftSetupError {
    #[error("invalid raft config: {0}")]
    Config(#[from] openraft::ConfigError),
    #[error("log store: {0}")]
    Store(#[from] sled::Error),
    #[error("snapshot store: {0}")]
    Snapshots(#[from] std::io::Error),
    #[error("raft startup: {0}")]
    Raft(String),
}

/// Raft RPC framing errors (bincode envelopes on the wire).
#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode raft rpc: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode raft rpc: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
