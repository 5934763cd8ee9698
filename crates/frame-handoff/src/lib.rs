//! Frame Hand-off Primitives
//!
//! Provides the two structures that connect the pipeline loops:
//! - `FrameMailbox`: single overwrite-able slot, newest write wins
//! - `processed_queue`: unbounded FIFO, many producers, one consumer,
//!   with an explicit stop sentinel for blocked consumers

mod mailbox;
mod queue;

pub use mailbox::FrameMailbox;
pub use queue::{processed_queue, QueueReceiver, QueueSender};

use thiserror::Error;

/// Hand-off error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("Queue consumer has been dropped")]
    Closed,
}
