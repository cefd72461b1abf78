//! Primitives shared by every crate in the auction coordination engine:
//! the task lifecycle state machine, the line-oriented wire codec, and the
//! client session abstraction that sits on top of a TCP connection.

pub mod client;
pub mod codec;
pub mod error;
pub mod handle;
pub mod task;

pub use client::{ClientId, ClientSession, TaskMailbox};
pub use codec::{decode, encode, Message};
pub use error::{SharedError, SharedResult};
pub use handle::TaskHandle;
pub use task::{Lifecycle, SessionId, StateLock, TaskId, TaskState};
