//! Queue manager - registry of queue actors.
//!
//! Concurrency discipline: operations on different queues run concurrently
//! under the read lock; queue creation, deletion, and whole-manager
//! snapshot/restore take the write lock. Serialization of operations within
//! one queue is the actor's job. The read lock also guarantees a handle
//! cannot be closed while a forwarded request is in flight.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::actor::QueueHandle;
use crate::protocol::{Code, Message, Queue, QueueConfig, Response};

pub struct QueueManager {
    queues: RwLock<HashMap<String, QueueHandle>>,
}

impl QueueManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queues: RwLock::new(HashMap::new()),
        })
    }

    /// Queue ids are a deterministic function of the configured name.
    pub fn queue_id(name: &str) -> String {
        format!("queue-{name}")
    }

    pub async fn create_queue(&self, config: QueueConfig) -> Code {
        let mut queues = self.queues.write().await;
        let id = Self::queue_id(&config.name);

        if queues.contains_key(&id) {
            return Code::QueueAlreadyExists;
        }

        info!(queue_id = %id, "creating queue");
        queues.insert(id.clone(), QueueHandle::spawn(Queue::new(id, config)));
        Code::Ok
    }

    pub async fn delete_queue(&self, id: &str) -> Code {
        let mut queues = self.queues.write().await;
        match queues.remove(id) {
            Some(handle) => {
                handle.close();
                info!(queue_id = %id, "deleted queue");
                Code::Ok
            }
            None => Code::QueueNotFound,
        }
    }

    pub async fn send_message(&self, id: &str, message: Message) -> Response {
        let queues = self.queues.read().await;
        match queues.get(id) {
            Some(handle) => handle
                .insert(message)
                .await
                .unwrap_or_else(|| Response::code(Code::QueueNotFound)),
            None => Response::code(Code::QueueNotFound),
        }
    }

    pub async fn peek_message(&self, id: &str) -> Response {
        let queues = self.queues.read().await;
        match queues.get(id) {
            Some(handle) => handle
                .peek()
                .await
                .unwrap_or_else(|| Response::code(Code::QueueNotFound)),
            None => Response::code(Code::QueueNotFound),
        }
    }

    pub async fn pop_message(&self, id: &str) -> Response {
        let queues = self.queues.read().await;
        match queues.get(id) {
            Some(handle) => handle
                .pop()
                .await
                .unwrap_or_else(|| Response::code(Code::QueueNotFound)),
            None => Response::code(Code::QueueNotFound),
        }
    }

    pub async fn requeue_message(&self, id: &str) -> Response {
        let queues = self.queues.read().await;
        match queues.get(id) {
            Some(handle) => handle
                .requeue()
                .await
                .unwrap_or_else(|| Response::code(Code::QueueNotFound)),
            None => Response::code(Code::QueueNotFound),
        }
    }

    /// All messages currently in the queue, without receive-count side
    /// effects.
    pub async fn view_messages(&self, id: &str) -> (Code, Vec<Message>) {
        let queues = self.queues.read().await;
        match queues.get(id) {
            Some(handle) => match handle.snapshot().await {
                Some(queue) => (Code::Ok, queue.messages.into_iter().collect()),
                None => (Code::QueueNotFound, Vec::new()),
            },
            None => (Code::QueueNotFound, Vec::new()),
        }
    }

    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }

    /// Consistent snapshot of every queue. Exclusive so the queue set cannot
    /// change while per-actor snapshots are collected; a `BTreeMap` keeps the
    /// serialized form identical across replicas.
    pub async fn snapshot_all(&self) -> BTreeMap<String, Queue> {
        let queues = self.queues.write().await;
        let mut snapshot = BTreeMap::new();
        for (id, handle) in queues.iter() {
            match handle.snapshot().await {
                Some(queue) => {
                    snapshot.insert(id.clone(), queue);
                }
                None => warn!(queue_id = %id, "queue actor gone during snapshot"),
            }
        }
        snapshot
    }

    /// Replace the entire queue set with the snapshot contents. All-or-
    /// nothing from the caller's view: the map is swapped under the write
    /// lock. Receive counters start over, per the snapshot contract.
    pub async fn restore_all(&self, snapshot: BTreeMap<String, Queue>) {
        let mut queues = self.queues.write().await;

        for (_, handle) in queues.drain() {
            handle.close();
        }

        let restored = snapshot.len();
        for (id, queue) in snapshot {
            queues.insert(id, QueueHandle::spawn(queue));
        }
        info!(queues = restored, "restored queue manager from snapshot");
    }
}
