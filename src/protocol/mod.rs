//! Protocol module - wire types shared by the queue core, the replicated
//! log, and the HTTP API.

mod command;
mod types;

pub use command::{Command, CommandType, DecodeError};
pub use types::{Code, CommandResult, Message, Queue, QueueConfig, QueueType, Response};
