//! Wire envelopes for the three raft RPCs.
//!
//! Bincode is used for the node-to-node hop only; it never reaches clients.

use openraft::error::PayloadTooLarge;
use openraft::network::RPCTypes;
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use serde::{Deserialize, Serialize};

use crate::raft::{NodeId, TypeConfig, WireError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RaftRequest {
    AppendEntries(AppendEntriesRequest<TypeConfig>),
    InstallSnapshot(InstallSnapshotRequest<TypeConfig>),
    Vote(VoteRequest<NodeId>),
}

impl RaftRequest {
    pub fn request_path(&self) -> &'static str {
        match self {
            RaftRequest::AppendEntries(_) => "append-entries",
            RaftRequest::InstallSnapshot(_) => "install-snapshot",
            RaftRequest::Vote(_) => "vote",
        }
    }

    pub fn rpc_type(&self) -> RPCTypes {
        match self {
            RaftRequest::AppendEntries(_) => RPCTypes::AppendEntries,
            RaftRequest::InstallSnapshot(_) => RPCTypes::InstallSnapshot,
            RaftRequest::Vote(_) => RPCTypes::Vote,
        }
    }

    pub fn payload_too_large(&self) -> PayloadTooLarge {
        match self {
            // Ask the leader to retry with half the batch.
            RaftRequest::AppendEntries(req) => {
                PayloadTooLarge::new_entries_hint(req.entries.len() as u64 / 2)
            }
            _ => PayloadTooLarge::new_entries_hint(0),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, WireError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::legacy())?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        let (req, _) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
        Ok(req)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RaftResponse {
    AppendEntries(AppendEntriesResponse<NodeId>),
    InstallSnapshot(InstallSnapshotResponse<NodeId>),
    Vote(VoteResponse<NodeId>),
}

impl RaftResponse {
    pub fn serialize(&self) -> Result<Vec<u8>, WireError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::legacy())?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        let (resp, _) = bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?;
        Ok(resp)
    }
}
