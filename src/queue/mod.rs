//! Queue module - per-queue actors and the queue manager.
//!
//! - `actor.rs` - one tokio task per queue, owning that queue's state
//! - `manager.rs` - registry of actors behind a readers/writer lock

mod actor;
mod manager;

#[cfg(test)]
mod tests;

pub use actor::QueueHandle;
pub use manager::QueueManager;
