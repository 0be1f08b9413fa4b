//! Process-level wiring of the send and receive pipelines
//!
//! A node owns every task of one end of the system and the cancellation token
//! they share. Dropping a node cancels its tasks.

mod receiver;
mod sender;

pub use receiver::{ReceiverNode, ReceiverReport};
pub use sender::{SenderNode, SenderReport};

use tokio::task::JoinError;

use crate::{DispatchError, Result};

fn joined<T>(task: &'static str, result: std::result::Result<T, JoinError>) -> Result<T> {
    result.map_err(|e| DispatchError::TaskFailed { task, reason: e.to_string() })
}
