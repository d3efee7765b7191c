//! Consensus node wrapper.
//!
//! Thin facade over `openraft::Raft` exposing what the rest of the service
//! needs: apply-with-timeout on the leader, leadership queries for the
//! redirect middleware, and voter addition for cluster joins. An empty peer
//! set at startup bootstraps a single-node cluster; otherwise the node waits
//! to be joined by an existing leader via `/raft/join`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use openraft::error::ClientWriteError;
use openraft::{Raft, ServerState};
use tokio::time::timeout;
use tracing::{debug, info};

use super::network::NetworkFactory;
use super::snapshot::SnapshotStore;
use super::state_machine::StateMachine;
use super::{ApplyError, LogStore, Node, NodeId, RaftSetupError, TypeConfig};
use crate::protocol::{Command, CommandResult};
use crate::queue::QueueManager;

/// How long a submitted command may wait for commit before the client gets
/// a timeout.
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RaftNode {
    id: NodeId,
    raft: Raft<TypeConfig>,
}

impl RaftNode {
    /// Stand up the raft node: durable log store and snapshot store under
    /// `data_dir`, state machine bound to `manager`. With `bootstrap` the
    /// node initializes a single-member cluster (a no-op on restart, when
    /// the log already holds a membership).
    pub async fn new(
        id: NodeId,
        node: Node,
        data_dir: &Path,
        manager: Arc<QueueManager>,
        bootstrap: bool,
    ) -> Result<Arc<Self>, RaftSetupError> {
        let config = openraft::Config {
            cluster_name: "simplyq".to_string(),
            heartbeat_interval: 250,
            election_timeout_min: 1000,
            election_timeout_max: 2000,
            ..Default::default()
        };
        let config = Arc::new(config.validate()?);

        let log_store = LogStore::open(data_dir)?;
        let snapshots = Arc::new(SnapshotStore::new(data_dir)?);
        let state_machine = StateMachine::new(manager, snapshots);
        let network = NetworkFactory::new(id);

        let raft = Raft::new(id, config, network, log_store, state_machine)
            .await
            .map_err(|e| RaftSetupError::Raft(e.to_string()))?;

        if bootstrap {
            let members = BTreeMap::from([(id, node)]);
            match raft.initialize(members).await {
                Ok(()) => info!(node_id = id, "bootstrapped single-node cluster"),
                // Already initialized from a previous run; the log wins.
                Err(e) if e.api_error().is_some() => {
                    debug!(node_id = id, error = %e, "cluster already initialized")
                }
                Err(e) => return Err(RaftSetupError::Raft(e.to_string())),
            }
        } else {
            info!(node_id = id, "waiting to be joined to an existing cluster");
        }

        Ok(Arc::new(Self { id, raft }))
    }

    /// The underlying raft handle, for the RPC endpoints.
    pub fn raft(&self) -> &Raft<TypeConfig> {
        &self.raft
    }

    /// Append a command to the replicated log, wait for commit, and return
    /// the local apply result. Leader only.
    pub async fn apply(&self, command: Command) -> Result<CommandResult, ApplyError> {
        match timeout(APPLY_TIMEOUT, self.raft.client_write(command)).await {
            Err(_) => Err(ApplyError::Timeout),
            Ok(Ok(resp)) => Ok(resp.data),
            Ok(Err(err)) => match err.api_error() {
                Some(ClientWriteError::ForwardToLeader(fwd)) => Err(ApplyError::NotLeader {
                    leader: fwd.leader_node.as_ref().map(|n| n.api_addr()),
                }),
                _ => Err(ApplyError::Internal(err.to_string())),
            },
        }
    }

    pub async fn is_leader(&self) -> bool {
        self.raft.current_leader().await == Some(self.id)
    }

    /// Current leader and its descriptor, if one is known.
    pub async fn leader(&self) -> Option<(NodeId, Node)> {
        let leader_id = self.raft.current_leader().await?;
        let membership = self.raft.metrics().borrow().membership_config.clone();
        let node = membership.membership().get_node(&leader_id)?.clone();
        Some((leader_id, node))
    }

    /// Add `node` as a voting member: first as a caught-up learner, then
    /// promoted into the voter set. Leader only.
    pub async fn add_voter(&self, id: NodeId, node: Node) -> Result<(), ApplyError> {
        self.raft
            .add_learner(id, node, true)
            .await
            .map_err(Self::membership_err)?;

        let mut voters: BTreeSet<NodeId> = {
            let membership = self.raft.metrics().borrow().membership_config.clone();
            membership.membership().voter_ids().collect()
        };
        voters.insert(id);

        self.raft
            .change_membership(voters, false)
            .await
            .map_err(Self::membership_err)?;

        info!(node_id = id, "added voter");
        Ok(())
    }

    /// Block until this node itself is the leader (single-node bootstrap).
    pub async fn wait_until_leader(&self, wait: Duration) -> Result<(), ApplyError> {
        self.raft
            .wait(Some(wait))
            .state(ServerState::Leader, "became leader")
            .await
            .map_err(|e| ApplyError::Internal(e.to_string()))?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.raft.shutdown().await {
            debug!(error = %e, "raft shutdown join error");
        }
    }

    fn membership_err(
        err: openraft::error::RaftError<NodeId, ClientWriteError<NodeId, Node>>,
    ) -> ApplyError {
        match err.api_error() {
            Some(ClientWriteError::ForwardToLeader(fwd)) => ApplyError::NotLeader {
                leader: fwd.leader_node.as_ref().map(|n| n.api_addr()),
            },
            _ => ApplyError::Internal(err.to_string()),
        }
    }
}
