//! The generic task lifecycle state machine (core component #1).
//!
//! Every long-lived unit of work in the coordination engine — auction tasks
//! included — is built on top of [`Lifecycle`]. It owns the five-state
//! machine described by the transition table below and the synchronization
//! handle (a [`tokio::sync::Notify`] paired with a private state cell) that
//! lets a scheduler wait for any task's state to change without polling.
//!
//! ```text
//! NEW -----start----> RUNNING
//!                      |  ^
//!               mark_endable  resume
//!                      v  |
//!                    ENDABLE ----try_end----> ENDING ----complete----> ENDED
//! ```
//!
//! All other edges are rejected; `ENDED` is terminal.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::SharedError;

/// Task identity, unique within a session.
pub type TaskId = u64;

/// Session identity, assigned by the coordinator.
pub type SessionId = u64;

/// The five lifecycle states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    New,
    Running,
    Endable,
    Ending,
    Ended,
}

impl TaskState {
    /// Ordering used by the scheduler's "at least ENDABLE" checks (§4.4).
    ///
    /// `New` has no defined rank relative to the others for this purpose;
    /// callers only ever compare `Endable`/`Ending`/`Ended` against it.
    pub fn at_least_endable(self) -> bool {
        matches!(self, TaskState::Endable | TaskState::Ending | TaskState::Ended)
    }
}

/// The shared synchronization handle a scheduler installs on every task it
/// drives, so that a state change in any one of them wakes a single waiter.
///
/// Before [`Lifecycle::new`] is ever replaced, each task owns its own private
/// `Notify` — the scheduler calls [`Lifecycle::set_state_lock`] exactly once,
/// before `execute` begins, to rebind every task onto the same handle. This
/// models the original "rebind the monitor object" trick as a value handed
/// around rather than relying on lock identity (see the Design Notes).
#[derive(Debug, Clone)]
pub struct StateLock {
    notify: Arc<Notify>,
}

impl StateLock {
    pub fn new() -> Self {
        Self { notify: Arc::new(Notify::new()) }
    }

    fn notify_waiters(&self) {
        self.notify.notify_waiters();
    }

    /// A future that resolves on the next `notify_waiters` call made after
    /// this method returns (not after the future is first polled) -
    /// Tokio's `Notified` captures its wake sequence number at construction
    /// time, which is what makes the construct-before-check idiom race-free.
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }
}

impl Default for StateLock {
    fn default() -> Self {
        Self::new()
    }
}

/// The task lifecycle state machine.
///
/// Embedded by composition (not inheritance) into every task type. Owns the
/// current [`TaskState`] behind a plain `std::sync::Mutex` — critical
/// sections are synchronous and never held across an `.await` — plus a
/// [`StateLock`] used purely for wakeups.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<TaskState>,
    lock: Mutex<StateLock>,
}

impl Lifecycle {
    /// A freshly constructed task starts `NEW` with a private state lock.
    pub fn new() -> Self {
        Self { state: Mutex::new(TaskState::New), lock: Mutex::new(StateLock::new()) }
    }

    /// Current state. Never blocks on I/O; the inner mutex guards only the
    /// enum value itself.
    pub fn state(&self) -> TaskState {
        *self.state.lock().expect("lifecycle state mutex poisoned")
    }

    /// Replace the lock/condition used by this task. Must only be called
    /// while the task is still `NEW` — matches §4.1's `setStateLock`
    /// contract ("must be called only while state is NEW").
    pub fn set_state_lock(&self, lock: StateLock) -> Result<(), SharedError> {
        let current = self.state();
        if current != TaskState::New {
            return Err(SharedError::LockReplacedAfterStart(current));
        }
        *self.lock.lock().expect("lifecycle lock mutex poisoned") = lock;
        Ok(())
    }

    fn lock_handle(&self) -> StateLock {
        self.lock.lock().expect("lifecycle lock mutex poisoned").clone()
    }

    /// Attempt a guarded transition. Returns whether it happened.
    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        let mut state = self.state.lock().expect("lifecycle state mutex poisoned");
        if *state != from {
            return false;
        }
        *state = to;
        drop(state);
        self.lock_handle().notify_waiters();
        true
    }

    /// `NEW -> RUNNING`, invoked by the task's run entrypoint.
    pub fn start(&self) -> bool {
        self.transition(TaskState::New, TaskState::Running)
    }

    /// `RUNNING -> ENDABLE`, invoked by the task's `idle`/handler logic.
    pub fn mark_endable(&self) -> bool {
        self.transition(TaskState::Running, TaskState::Endable)
    }

    /// `ENDABLE -> RUNNING`, invoked when a late event (e.g. a qualifying
    /// bid) un-ends the task.
    pub fn resume(&self) -> bool {
        self.transition(TaskState::Endable, TaskState::Running)
    }

    /// `ENDABLE -> ENDING`, invoked by the scheduler. Idempotent: calling it
    /// again once already `Ending`/`Ended` simply returns `false`.
    pub fn try_end(&self) -> bool {
        self.transition(TaskState::Endable, TaskState::Ending)
    }

    /// `ENDING -> ENDED`, invoked by the run loop after resolution/teardown.
    pub fn complete(&self) -> bool {
        self.transition(TaskState::Ending, TaskState::Ended)
    }

    /// Block until state is `ENDED`. Race-free against `notify_waiters`
    /// fired after this call begins, via Tokio's construct-before-check
    /// `Notified` pattern; tolerates spurious wakeups by re-checking in a
    /// loop.
    pub async fn wait_for_end(&self) {
        loop {
            let notify = self.lock_handle().notify.clone();
            let notified = notify.notified();
            if self.state() == TaskState::Ended {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
