//! Outbound raft RPC client.
//!
//! Each peer gets a `NetworkClient` that POSTs bincode envelopes to the
//! peer's raft listener and maps transport failures onto openraft's RPC
//! error taxonomy.

use openraft::error::{
    InstallSnapshotError, NetworkError, RPCError, RaftError, Timeout, Unreachable,
};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use tracing::error;

use super::request::{RaftRequest, RaftResponse};
use crate::raft::{Node, NodeId, TypeConfig};

pub struct NetworkFactory {
    local: NodeId,
}

impl NetworkFactory {
    pub fn new(local: NodeId) -> Self {
        Self { local }
    }
}

impl RaftNetworkFactory<TypeConfig> for NetworkFactory {
    type Network = NetworkClient;

    async fn new_client(&mut self, target: NodeId, node: &Node) -> Self::Network {
        NetworkClient::new(self.local, target, node.clone())
    }
}

pub struct NetworkClient {
    client: reqwest::Client,
    local: NodeId,
    target: NodeId,
    node: Node,
}

impl NetworkClient {
    pub fn new(local: NodeId, target: NodeId, node: Node) -> Self {
        Self {
            client: reqwest::Client::new(),
            local,
            target,
            node,
        }
    }

    fn request_url(&self, req: &RaftRequest) -> String {
        format!("http://{}/raft/{}", self.node.raft_addr(), req.request_path())
    }

    async fn request<Err>(
        &self,
        req: RaftRequest,
        option: RPCOption,
    ) -> Result<RaftResponse, RPCError<NodeId, Node, Err>>
    where
        Err: std::error::Error + 'static,
    {
        let url = self.request_url(&req);

        let body = req.serialize().map_err(|e| {
            error!(url, error = %e, "failed to serialize raft request");
            RPCError::Unreachable(Unreachable::new(&e))
        })?;

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .timeout(option.hard_ttl())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RPCError::Network(NetworkError::new(&e))
                } else if e.is_timeout() {
                    RPCError::Timeout(Timeout {
                        action: req.rpc_type(),
                        id: self.local,
                        target: self.target,
                        timeout: option.hard_ttl(),
                    })
                } else {
                    RPCError::Unreachable(Unreachable::new(&e))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let msg = format!("raft rpc to {url} failed with status {status}");
            error!("{}", msg);
            if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
                return Err(RPCError::PayloadTooLarge(req.payload_too_large()));
            }
            let err = std::io::Error::other(msg);
            if status.is_server_error() {
                return Err(RPCError::Network(NetworkError::new(&err)));
            }
            return Err(RPCError::Unreachable(Unreachable::new(&err)));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))?;

        RaftResponse::deserialize(&bytes).map_err(|e| {
            error!(url, error = %e, "failed to decode raft response");
            RPCError::Unreachable(Unreachable::new(&e))
        })
    }
}

impl RaftNetwork<TypeConfig> for NetworkClient {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, Node, RaftError<NodeId>>> {
        match self.request(RaftRequest::AppendEntries(rpc), option).await? {
            RaftResponse::AppendEntries(resp) => Ok(resp),
            other => {
                error!(?other, "peer answered append-entries with wrong envelope");
                Err(RPCError::Network(NetworkError::new(&std::io::Error::other(
                    "mismatched raft response envelope",
                ))))
            }
        }
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, Node, RaftError<NodeId, InstallSnapshotError>>,
    > {
        match self.request(RaftRequest::InstallSnapshot(rpc), option).await? {
            RaftResponse::InstallSnapshot(resp) => Ok(resp),
            other => {
                error!(?other, "peer answered install-snapshot with wrong envelope");
                Err(RPCError::Network(NetworkError::new(&std::io::Error::other(
                    "mismatched raft response envelope",
                ))))
            }
        }
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, Node, RaftError<NodeId>>> {
        match self.request(RaftRequest::Vote(rpc), option).await? {
            RaftResponse::Vote(resp) => Ok(resp),
            other => {
                error!(?other, "peer answered vote with wrong envelope");
                Err(RPCError::Network(NetworkError::new(&std::io::Error::other(
                    "mismatched raft response envelope",
                ))))
            }
        }
    }
}
