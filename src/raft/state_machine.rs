//! Replicated state machine: the deterministic interpreter of committed
//! commands as queue-manager mutations.
//!
//! Apply depends only on the command sequence - never on the clock or any
//! per-node state - so replicas that apply the same log prefix hold equal
//! queue state. PEEK and VIEW travel through the log like everything else;
//! PEEK mutates the receive counter, which is exactly why it must.

use std::collections::BTreeMap;
use std::sync::Arc;

use openraft::storage::RaftStateMachine;
use openraft::{
    Entry, EntryPayload, OptionalSend, RaftSnapshotBuilder, Snapshot, SnapshotMeta, StorageError,
    StorageIOError, StoredMembership,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::snapshot::{SnapshotData, SnapshotStore, SnapshotStoreRef};
use super::{LogId, Node, NodeId, StorageResult, TypeConfig};
use crate::protocol::{Code, Command, CommandResult, CommandType, Queue};
use crate::queue::QueueManager;

type Membership = StoredMembership<NodeId, Node>;

#[derive(Debug, Default)]
struct StateMachineData {
    last_applied: Option<LogId>,
    last_membership: Membership,
}

#[derive(Clone)]
pub struct StateMachine {
    data: Arc<RwLock<StateMachineData>>,
    manager: Arc<QueueManager>,
    snapshots: SnapshotStoreRef,
}

impl StateMachine {
    pub fn new(manager: Arc<QueueManager>, snapshots: SnapshotStoreRef) -> Self {
        Self {
            data: Arc::new(RwLock::new(StateMachineData::default())),
            manager,
            snapshots,
        }
    }

    async fn apply_command(&self, command: Command) -> CommandResult {
        // A command that decodes but misses its payload addresses no queue.
        // Applying it as a not-found no-op keeps every replica in lockstep.
        let queue_id = command.queue_id.as_deref().unwrap_or("");

        match command.command_type {
            CommandType::CreateQueue => match command.queue_config {
                Some(config) => CommandResult::Code(self.manager.create_queue(config).await),
                None => CommandResult::Code(Code::QueueNotFound),
            },
            CommandType::DeleteQueue => {
                CommandResult::Code(self.manager.delete_queue(queue_id).await)
            }
            CommandType::SendMessage => match command.message {
                Some(message) => {
                    CommandResult::Response(self.manager.send_message(queue_id, message).await)
                }
                None => CommandResult::Code(Code::QueueNotFound),
            },
            CommandType::PeekMessage => {
                CommandResult::Response(self.manager.peek_message(queue_id).await)
            }
            CommandType::PopMessage => {
                CommandResult::Response(self.manager.pop_message(queue_id).await)
            }
            CommandType::Requeue => {
                CommandResult::Response(self.manager.requeue_message(queue_id).await)
            }
            CommandType::ViewQueue => {
                let (code, messages) = self.manager.view_messages(queue_id).await;
                CommandResult::Queue { code, messages }
            }
        }
    }

    fn decode_queues(bytes: &[u8]) -> StorageResult<BTreeMap<String, Queue>> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::IO {
            source: StorageIOError::read_snapshot(None, &e),
        })
    }
}

impl RaftStateMachine<TypeConfig> for StateMachine {
    type SnapshotBuilder = Self;

    async fn applied_state(&mut self) -> StorageResult<(Option<LogId>, Membership)> {
        let data = self.data.read().await;
        Ok((data.last_applied, data.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> StorageResult<Vec<CommandResult>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let entries = entries.into_iter();
        let mut replies = Vec::with_capacity(entries.size_hint().0);

        let mut data = self.data.write().await;
        for entry in entries {
            data.last_applied = Some(entry.log_id);

            let reply = match entry.payload {
                EntryPayload::Blank => CommandResult::Code(Code::Ok),
                EntryPayload::Normal(command) => self.apply_command(command).await,
                EntryPayload::Membership(membership) => {
                    info!(?membership, "applying membership change");
                    data.last_membership = StoredMembership::new(Some(entry.log_id), membership);
                    CommandResult::Code(Code::Ok)
                }
            };
            replies.push(reply);
        }

        Ok(replies)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn begin_receiving_snapshot(&mut self) -> StorageResult<Box<tokio::fs::File>> {
        self.snapshots.begin_receiving().await
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, Node>,
        snapshot: Box<tokio::fs::File>,
    ) -> StorageResult<()> {
        let data = self.snapshots.install(meta, snapshot).await?;
        let queues = Self::decode_queues(&data.queues)?;

        // Restore is all-or-nothing: the manager swaps its queue set under
        // the write lock only after the snapshot decoded cleanly.
        self.manager.restore_all(queues).await;

        let mut state = self.data.write().await;
        state.last_applied = data.meta.last_log_id;
        state.last_membership = data.meta.last_membership.clone();

        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> StorageResult<Option<Snapshot<TypeConfig>>> {
        let Some((path, data)) = self.snapshots.load_current().await? else {
            return Ok(None);
        };

        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            StorageError::IO {
                source: StorageIOError::read(&e),
            }
        })?;

        Ok(Some(Snapshot {
            meta: data.meta,
            snapshot: Box::new(file),
        }))
    }
}

impl RaftSnapshotBuilder<TypeConfig> for StateMachine {
    async fn build_snapshot(&mut self) -> StorageResult<Snapshot<TypeConfig>> {
        let meta = {
            let data = self.data.read().await;
            SnapshotMeta {
                last_log_id: data.last_applied,
                last_membership: data.last_membership.clone(),
                snapshot_id: SnapshotStore::generate_snapshot_id(data.last_applied.as_ref()),
            }
        };

        let queues = self.manager.snapshot_all().await;
        let bytes = serde_json::to_vec(&queues).map_err(|e| StorageError::IO {
            source: StorageIOError::write_snapshot(None, &e),
        })?;

        let snapshot = SnapshotData::new(meta.clone(), bytes);
        let path = self.snapshots.save(&snapshot).await?;

        let keep_id = meta.snapshot_id.clone();
        let store = self.snapshots.clone();
        tokio::spawn(async move {
            if let Err(e) = store.reap_older_than(&keep_id).await {
                warn!(error = %e, "failed to reap old snapshots");
            }
        });

        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            StorageError::IO {
                source: StorageIOError::read(&e),
            }
        })?;

        Ok(Snapshot {
            meta,
            snapshot: Box::new(file),
        })
    }
}
