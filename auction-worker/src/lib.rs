//! The auction task run loop and the reference ascending-auction
//! specialization built on top of `auction-shared`'s lifecycle and client
//! session primitives.

pub mod ascending;
pub mod context;
pub mod error;
pub mod logic;
pub mod task;

pub use ascending::AscendingAuction;
pub use context::TaskContext;
pub use error::{WorkerError, WorkerResult};
pub use logic::AuctionLogic;
pub use task::AuctionTask;
