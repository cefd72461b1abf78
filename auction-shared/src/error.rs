//! Error types shared across the coordination engine.

use thiserror::Error;

/// Result alias for fallible operations in the shared layer.
pub type SharedResult<T> = Result<T, SharedError>;

/// Errors surfaced by the task lifecycle, wire codec, and client session.
///
/// State transitions themselves never fail with an error (§4.1: "Failure:
/// none; transitions never throw") — illegal transitions simply return
/// `false` from [`crate::task::Lifecycle`]'s methods.
#[derive(Debug, Error)]
pub enum SharedError {
    #[error("set_state_lock called while task is not NEW (current state: {0:?})")]
    LockReplacedAfterStart(crate::task::TaskState),

    #[error("client session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("client session closed")]
    SessionClosed,
}
