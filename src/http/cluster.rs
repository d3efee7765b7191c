//! Cluster HTTP handlers: status, join, leader redirect, and the raft RPC
//! endpoints served on the raft port.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::raft::network::{RaftRequest, RaftResponse};
use crate::raft::{ApplyError, Node};

use super::types::{AppState, JoinRequest};

/// Redirect middleware for leader-only routes. Non-leaders answer 307 with
/// the current leader's HTTP address so clients can retry there.
pub async fn leader_redirect(
    State(raft): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if raft.is_leader().await {
        return next.run(request).await;
    }

    let leader = raft.leader().await.map(|(_, node)| node.api_addr());
    not_leader_response(leader)
}

pub fn not_leader_response(leader: Option<String>) -> Response {
    let hint = leader.unwrap_or_else(|| "unknown".to_string());
    (
        StatusCode::TEMPORARY_REDIRECT,
        format!("Not the leader. Current leader: {hint}"),
    )
        .into_response()
}

/// Map a consensus failure onto the client-facing status codes.
pub fn apply_error_response(err: ApplyError) -> Response {
    match err {
        // The leadership check raced a leader change; same answer as the
        // middleware would have given.
        ApplyError::NotLeader { leader } => not_leader_response(leader),
        ApplyError::Timeout | ApplyError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to apply command: {err}"),
        )
            .into_response(),
    }
}

/// Raft cluster status, leader-independent.
pub async fn status(State(raft): State<AppState>) -> String {
    let is_leader = raft.is_leader().await;
    let leader = raft
        .leader()
        .await
        .map(|(_, node)| node.api_addr())
        .unwrap_or_else(|| "unknown".to_string());

    format!("Raft Status:\n  Is Leader: {is_leader}\n  Current Leader: {leader}\n")
}

/// Add a voter to the cluster. Leader-only (behind the redirect middleware).
pub async fn join(State(raft): State<AppState>, Json(req): Json<JoinRequest>) -> Response {
    if req.address.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing node ID or address").into_response();
    }
    let Some((host, raft_port)) = parse_host_port(&req.address) else {
        return (
            StatusCode::BAD_REQUEST,
            "Address must be of the form host:port",
        )
            .into_response();
    };

    let node = Node::new(host, raft_port, req.api_port);
    match raft.add_voter(req.id, node).await {
        Ok(()) => format!(
            "Node {} at {} successfully joined the cluster",
            req.id, req.address
        )
        .into_response(),
        Err(ApplyError::NotLeader { leader }) => not_leader_response(leader),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to add voter: {err}"),
        )
            .into_response(),
    }
}

fn parse_host_port(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

// Raft RPC endpoints. Bodies are bincode envelopes produced by the peer's
// NetworkClient; responses use the matching envelope type.

pub async fn append_entries(State(raft): State<AppState>, body: Bytes) -> Response {
    let rpc = match RaftRequest::deserialize(&body) {
        Ok(RaftRequest::AppendEntries(rpc)) => rpc,
        Ok(_) => return envelope_mismatch(),
        Err(err) => return decode_failure(err),
    };

    match raft.raft().append_entries(rpc).await {
        Ok(resp) => encode_response(RaftResponse::AppendEntries(resp)),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

pub async fn install_snapshot(State(raft): State<AppState>, body: Bytes) -> Response {
    let rpc = match RaftRequest::deserialize(&body) {
        Ok(RaftRequest::InstallSnapshot(rpc)) => rpc,
        Ok(_) => return envelope_mismatch(),
        Err(err) => return decode_failure(err),
    };

    match raft.raft().install_snapshot(rpc).await {
        Ok(resp) => encode_response(RaftResponse::InstallSnapshot(resp)),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

pub async fn vote(State(raft): State<AppState>, body: Bytes) -> Response {
    let rpc = match RaftRequest::deserialize(&body) {
        Ok(RaftRequest::Vote(rpc)) => rpc,
        Ok(_) => return envelope_mismatch(),
        Err(err) => return decode_failure(err),
    };

    match raft.raft().vote(rpc).await {
        Ok(resp) => encode_response(RaftResponse::Vote(resp)),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

fn encode_response(resp: RaftResponse) -> Response {
    match resp.serialize() {
        Ok(bytes) => bytes.into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode raft rpc response");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn envelope_mismatch() -> Response {
    (StatusCode::BAD_REQUEST, "Mismatched raft request envelope").into_response()
}

fn decode_failure(err: crate::raft::WireError) -> Response {
    warn!(error = %err, "failed to decode raft rpc request");
    (StatusCode::BAD_REQUEST, err.to_string()).into_response()
}
