//! Per-queue actor.
//!
//! Each queue is owned by a single task that processes one request at a
//! time, so operations on one queue are totally ordered by arrival and no
//! locking is needed inside the actor. The actor listens on three channels:
//! requests (insert/peek/pop/requeue, each carrying a one-shot reply slot),
//! snapshot slots answered with a by-value copy of the queue, and an end
//! signal that terminates the loop.
//!
//! The actor never reads the wall clock: message timestamps arrive already
//! stamped, which keeps replicated applies deterministic.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::protocol::{Code, Message, Queue, Response};

enum QueueRequest {
    Insert {
        message: Message,
        reply: oneshot::Sender<Response>,
    },
    Peek {
        reply: oneshot::Sender<Response>,
    },
    Pop {
        reply: oneshot::Sender<Response>,
    },
    Requeue {
        reply: oneshot::Sender<Response>,
    },
}

/// Owning handle to a queue actor. Held exclusively by the queue manager;
/// dropping the handle (or calling [`QueueHandle::close`]) terminates the
/// actor. Requests sent after close receive no reply, so the manager must
/// not race a close with in-flight sends - its write lock enforces that.
pub struct QueueHandle {
    request_tx: mpsc::UnboundedSender<QueueRequest>,
    snapshot_tx: mpsc::UnboundedSender<oneshot::Sender<Queue>>,
    end_tx: mpsc::UnboundedSender<()>,
}

impl QueueHandle {
    /// Spawn an actor owning `queue`. The receive counter always starts at
    /// zero, which is what makes snapshot restore reset it.
    pub fn spawn(queue: Queue) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (end_tx, end_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_queue(queue, request_rx, snapshot_rx, end_rx));

        Self {
            request_tx,
            snapshot_tx,
            end_tx,
        }
    }

    pub async fn insert(&self, message: Message) -> Option<Response> {
        let (reply, rx) = oneshot::channel();
        self.request_tx
            .send(QueueRequest::Insert { message, reply })
            .ok()?;
        rx.await.ok()
    }

    pub async fn peek(&self) -> Option<Response> {
        let (reply, rx) = oneshot::channel();
        self.request_tx.send(QueueRequest::Peek { reply }).ok()?;
        rx.await.ok()
    }

    pub async fn pop(&self) -> Option<Response> {
        let (reply, rx) = oneshot::channel();
        self.request_tx.send(QueueRequest::Pop { reply }).ok()?;
        rx.await.ok()
    }

    pub async fn requeue(&self) -> Option<Response> {
        let (reply, rx) = oneshot::channel();
        self.request_tx.send(QueueRequest::Requeue { reply }).ok()?;
        rx.await.ok()
    }

    /// Fully materialized copy of the queue, served between requests.
    pub async fn snapshot(&self) -> Option<Queue> {
        let (reply, rx) = oneshot::channel();
        self.snapshot_tx.send(reply).ok()?;
        rx.await.ok()
    }

    /// Signal the actor to stop. Pending requests already in the channel are
    /// not drained.
    pub fn close(&self) {
        let _ = self.end_tx.send(());
    }
}

async fn run_queue(
    mut queue: Queue,
    mut request_rx: mpsc::UnboundedReceiver<QueueRequest>,
    mut snapshot_rx: mpsc::UnboundedReceiver<oneshot::Sender<Queue>>,
    mut end_rx: mpsc::UnboundedReceiver<()>,
) {
    // Times the current head has been peeked. Actor-local: resets on spawn.
    let mut head_receive_count: u32 = 0;

    loop {
        tokio::select! {
            request = request_rx.recv() => match request {
                Some(request) => handle_request(&mut queue, &mut head_receive_count, request),
                None => break,
            },
            slot = snapshot_rx.recv() => match slot {
                Some(slot) => {
                    let _ = slot.send(queue.clone());
                }
                None => break,
            },
            _ = end_rx.recv() => break,
        }
    }

    debug!(queue_id = %queue.id, "queue actor stopped");
}

fn handle_request(queue: &mut Queue, head_receive_count: &mut u32, request: QueueRequest) {
    match request {
        QueueRequest::Insert { message, reply } => {
            let max = queue.config.max_message_size;
            if max > 0 && message.body.len() as u64 > max {
                let _ = reply.send(Response::code(Code::MessageTooLarge));
                return;
            }
            queue.messages.push_back(message.clone());
            let _ = reply.send(Response::ok(message));
        }
        QueueRequest::Peek { reply } => {
            let Some(head) = queue.messages.front().cloned() else {
                let _ = reply.send(Response::code(Code::EmptyQueue));
                return;
            };
            *head_receive_count += 1;
            if *head_receive_count >= queue.config.max_receive_count {
                // Receive limit reached: banish the head to the dead-letter
                // list. This very reply still carries it.
                if let Some(dead) = queue.messages.pop_front() {
                    queue.dead_letter.push_back(dead);
                }
                *head_receive_count = 0;
            }
            let _ = reply.send(Response::ok(head));
        }
        QueueRequest::Pop { reply } => {
            if queue.messages.pop_front().is_none() {
                let _ = reply.send(Response::code(Code::EmptyQueue));
                return;
            }
            *head_receive_count = 0;
            let _ = reply.send(Response::code(Code::Ok));
        }
        QueueRequest::Requeue { reply } => {
            let Some(message) = queue.dead_letter.pop_front() else {
                let _ = reply.send(Response::code(Code::EmptyDeadLetterQueue));
                return;
            };
            queue.messages.push_back(message.clone());
            let _ = reply.send(Response::ok(message));
        }
    }
}
