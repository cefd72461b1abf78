//! The hook trait every auction specialization implements.
//!
//! `auction-shared` provides the generic run loop and lifecycle; this trait
//! is the seam where a concrete auction type (ascending, sealed-bid, ...)
//! plugs in its own state and message handling, matching the Design Notes'
//! "interface describing the task's observable contract plus a reusable
//! run-loop helper that takes injected hooks."
//!
//! Rendered as `handles`/`handle` rather than a literal
//! `HashMap<&str, Box<dyn Fn(...)>>` of handler closures: a logic type's
//! handlers close over its own interior-mutable state (e.g. the current
//! high bid), which a per-instance map of boxed closures would need to
//! capture `&self` into in a way the borrow checker cannot express for an
//! object-safe trait. Dispatch by name achieves the same "mapping from
//! message-type string to handler" contract from §3 without that fight.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::context::TaskContext;
use crate::error::WorkerResult;

#[async_trait]
pub trait AuctionLogic: Send + Sync + 'static {
    /// Called once, immediately after the task transitions `NEW -> RUNNING`
    /// and registers with its clients.
    async fn initialize(&self, ctx: &TaskContext<'_>);

    /// Called on every mailbox poll timeout (no message within 50ms).
    async fn idle(&self, ctx: &TaskContext<'_>);

    /// Called once, after the run loop exits the `state < ENDING` loop and
    /// before unregistering from clients.
    async fn resolve(&self, ctx: &TaskContext<'_>);

    /// Whether this logic has a handler registered for `msg_type`.
    fn handles(&self, msg_type: &str) -> bool;

    /// Invoke the handler for `msg_type` with the message's decoded fields
    /// (the `sessionId`/`auctionId` keys have already been validated and
    /// stripped by the run loop). Only called when [`Self::handles`]
    /// returned `true` for the same type.
    async fn handle(
        &self,
        msg_type: &str,
        args: &BTreeMap<String, String>,
        ctx: &TaskContext<'_>,
    ) -> WorkerResult<()>;
}
