//! The scheduler-facing view of a task.
//!
//! The scheduler drives a heterogeneous set of auction task specializations
//! (an `AuctionTask<AscendingAuction>` today, others later) without knowing
//! their concrete type. [`TaskHandle`] is the trait object seam that makes
//! that possible; `auction-worker` implements it so `auction-scheduler`
//! never needs to depend on the concrete task type.

use async_trait::async_trait;

use crate::error::SharedResult;
use crate::task::{StateLock, TaskId, TaskState};

#[async_trait]
pub trait TaskHandle: Send + Sync {
    fn id(&self) -> TaskId;

    fn state(&self) -> TaskState;

    /// Rebind this task's wakeup handle. Scheduler calls this once per task,
    /// before `execute` begins, while every task is still `NEW`.
    fn set_state_lock(&self, lock: StateLock) -> SharedResult<()>;

    /// `ENDABLE -> ENDING`. Idempotent.
    fn try_end(&self) -> bool;

    async fn wait_for_end(&self);

    /// Broadcast this task's configured params to every bound client.
    async fn send_spec(&self);

    /// Launch the task's run loop onto the runtime. Detached: cancellation
    /// of an in-flight schedule is out of scope (§5).
    fn spawn_run(&self);
}
