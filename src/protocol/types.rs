//! Core protocol types for SimplyQ.
//!
//! Contains Message, QueueConfig, Queue, and the domain result codes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A single queued message.
///
/// `id` is client-supplied and not checked for uniqueness. `timestamp` is
/// milliseconds since the Unix epoch; `0` means unset. The HTTP front stamps
/// it before a SEND_MESSAGE command is encoded so that every replica applies
/// the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub timestamp: u64,
}

impl Message {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            timestamp: 0,
        }
    }
}

/// Queue type - reserved, currently no behavioral difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    Standard,
    Fifo,
}

/// Per-queue configuration. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_queue_type")]
    pub queue_type: QueueType,
    #[serde(default = "default_retention_period")]
    pub retention_period: u64,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout: u64,
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u64,
}

fn default_queue_type() -> QueueType {
    QueueType::Fifo
}

fn default_retention_period() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_visibility_timeout() -> u64 {
    30 * 1000
}

fn default_max_receive_count() -> u32 {
    3
}

fn default_max_message_size() -> u64 {
    1024 * 1024
}

impl QueueConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue_type: default_queue_type(),
            retention_period: default_retention_period(),
            visibility_timeout: default_visibility_timeout(),
            max_receive_count: default_max_receive_count(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// Full by-value state of one queue, as produced by an actor snapshot and
/// as stored in cluster snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub id: String,
    pub config: QueueConfig,
    pub messages: VecDeque<Message>,
    pub dead_letter: VecDeque<Message>,
}

impl Queue {
    pub fn new(id: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            id: id.into(),
            config,
            messages: VecDeque::new(),
            dead_letter: VecDeque::new(),
        }
    }
}

/// Domain result codes. Serialized as small integers in every JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Code {
    Ok = 0,
    EmptyQueue = 1,
    EmptyDeadLetterQueue = 2,
    QueueNotFound = 3,
    QueueAlreadyExists = 4,
    MessageTooLarge = 5,
}

impl From<Code> for u8 {
    fn from(code: Code) -> u8 {
        code as u8
    }
}

impl TryFrom<u8> for Code {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Code::Ok),
            1 => Ok(Code::EmptyQueue),
            2 => Ok(Code::EmptyDeadLetterQueue),
            3 => Ok(Code::QueueNotFound),
            4 => Ok(Code::QueueAlreadyExists),
            5 => Ok(Code::MessageTooLarge),
            other => Err(format!("unknown code: {other}")),
        }
    }
}

/// Reply produced by a queue actor for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub code: Code,
}

impl Response {
    pub fn ok(message: Message) -> Self {
        Self {
            message: Some(message),
            code: Code::Ok,
        }
    }

    pub fn code(code: Code) -> Self {
        Self {
            message: None,
            code,
        }
    }
}

/// Result of applying one committed command, surfaced to the submitter on
/// the leader. CREATE/DELETE yield a bare code, message operations a
/// `Response`, and VIEW_QUEUE the full message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandResult {
    Code(Code),
    Response(Response),
    Queue { code: Code, messages: Vec<Message> },
}

impl CommandResult {
    /// The domain code carried by any variant.
    pub fn result_code(&self) -> Code {
        match self {
            CommandResult::Code(code) => *code,
            CommandResult::Response(resp) => resp.code,
            CommandResult::Queue { code, .. } => *code,
        }
    }
}
