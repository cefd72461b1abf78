//! Errors raised while dispatching an inbound message to a handler.
//!
//! These never escape a task's run loop: the dispatch loop logs them and
//! moves on to the next message (§7, "Malformed message").

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("message missing required field {0:?}")]
    MissingField(&'static str),

    #[error("field {field:?} is not a valid integer: {value:?}")]
    InvalidInt { field: &'static str, value: String },
}
