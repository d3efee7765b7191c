//! HTTP API request and response types.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol::{Code, Message, QueueConfig};
use crate::raft::{NodeId, RaftNode};

/// Shared application state: every handler goes through the consensus node.
pub type AppState = Arc<RaftNode>;

/// `queueID` query parameter carried by every queue-targeted endpoint.
#[derive(Deserialize)]
pub struct QueueIdQuery {
    #[serde(rename = "queueID")]
    pub queue_id: String,
}

/// Cluster join request.
#[derive(Deserialize)]
pub struct JoinRequest {
    pub id: NodeId,
    /// Raft RPC address of the joining node, `host:port`.
    pub address: String,
    /// Public HTTP port of the joining node, used in leader redirects.
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_api_port() -> u16 {
    8080
}

#[derive(Serialize)]
pub struct CreateQueueResponse {
    pub code: Code,
    pub queue_config: QueueConfig,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub code: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Serialize)]
pub struct CodeResponse {
    pub code: Code,
}

#[derive(Serialize)]
pub struct ViewResponse {
    pub code: Code,
    pub messages: Vec<Message>,
}
