//! Command envelope and codec.
//!
//! Every mutating or queue-targeted operation travels through the replicated
//! log as one `Command`. The encoding is JSON with a fixed integer tag and a
//! fixed field order, so identical inputs produce byte-identical entries on
//! every replica.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Message, QueueConfig};

/// Command tags. The numeric values are a wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CommandType {
    CreateQueue = 0,
    DeleteQueue = 1,
    SendMessage = 2,
    PeekMessage = 3,
    PopMessage = 4,
    Requeue = 5,
    ViewQueue = 6,
}

impl From<CommandType> for u8 {
    fn from(kind: CommandType) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for CommandType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CommandType::CreateQueue),
            1 => Ok(CommandType::DeleteQueue),
            2 => Ok(CommandType::SendMessage),
            3 => Ok(CommandType::PeekMessage),
            4 => Ok(CommandType::PopMessage),
            5 => Ok(CommandType::Requeue),
            6 => Ok(CommandType::ViewQueue),
            other => Err(format!("unknown command type: {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid command encoding: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Tagged command envelope. Only the fields relevant to `command_type` are
/// present; absent fields are omitted from the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_config: Option<QueueConfig>,
}

impl Command {
    pub fn create_queue(config: QueueConfig) -> Self {
        Self {
            command_type: CommandType::CreateQueue,
            queue_id: None,
            message: None,
            queue_config: Some(config),
        }
    }

    pub fn delete_queue(queue_id: impl Into<String>) -> Self {
        Self::targeting(CommandType::DeleteQueue, queue_id)
    }

    pub fn send_message(queue_id: impl Into<String>, message: Message) -> Self {
        Self {
            command_type: CommandType::SendMessage,
            queue_id: Some(queue_id.into()),
            message: Some(message),
            queue_config: None,
        }
    }

    pub fn peek_message(queue_id: impl Into<String>) -> Self {
        Self::targeting(CommandType::PeekMessage, queue_id)
    }

    pub fn pop_message(queue_id: impl Into<String>) -> Self {
        Self::targeting(CommandType::PopMessage, queue_id)
    }

    pub fn requeue(queue_id: impl Into<String>) -> Self {
        Self::targeting(CommandType::Requeue, queue_id)
    }

    pub fn view_queue(queue_id: impl Into<String>) -> Self {
        Self::targeting(CommandType::ViewQueue, queue_id)
    }

    fn targeting(command_type: CommandType, queue_id: impl Into<String>) -> Self {
        Self {
            command_type,
            queue_id: Some(queue_id.into()),
            message: None,
            queue_config: None,
        }
    }

    /// Encode to the canonical log representation.
    pub fn encode(&self) -> Vec<u8> {
        // Struct field order is fixed, so this is deterministic.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
