//! Queue core tests: actor semantics and manager registry behavior.


use super::{QueueHandle, QueueManager};
use crate::protocol::{Code, Message, Queue, QueueConfig};

fn msg(id: &str, body: &str) -> Message {
    Message::new(id, body)
}

fn config(name: &str) -> QueueConfig {
    QueueConfig::named(name)
}

fn spawn(name: &str) -> QueueHandle {
    let id = QueueManager::queue_id(name);
    QueueHandle::spawn(Queue::new(id, config(name)))
}
