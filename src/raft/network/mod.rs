//! Node-to-node raft transport: bincode envelopes over HTTP.

mod client;
mod request;

pub use client::{NetworkClient, NetworkFactory};
pub use request::{RaftRequest, RaftResponse};
