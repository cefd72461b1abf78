//! Errors raised while building or driving a [`crate::scheduler::Scheduler`]
//! or the [`crate::coordinator::Coordinator`] that sits on top of it.

use auction_shared::TaskId;
use thiserror::Error;

use crate::config::ConfigError;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task {0} is not registered")]
    UnknownTask(TaskId),

    #[error("task {0} cannot depend on itself")]
    SelfDependency(TaskId),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    #[error("no clients connected within the configured wait time")]
    NoClientsConnected,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
