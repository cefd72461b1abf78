//! What an [`crate::logic::AuctionLogic`] implementation is handed on every
//! hook invocation: read-only access to this task's identity and configured
//! params, plus the ability to broadcast a message or request a lifecycle
//! transition. Kept separate from [`crate::task::AuctionTask`] itself so
//! logic implementations never see the mailbox or the client registration
//! machinery.

use std::collections::HashMap;
use std::sync::Arc;

use auction_shared::{ClientSession, Lifecycle, Message, SessionId, TaskId};
use tracing::debug;

pub struct TaskContext<'a> {
    pub(crate) task_id: TaskId,
    pub(crate) session_id: SessionId,
    pub(crate) params: &'a HashMap<String, String>,
    pub(crate) lifecycle: &'a Lifecycle,
    pub(crate) clients: &'a [Arc<ClientSession>],
}

impl<'a> TaskContext<'a> {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn params(&self) -> &HashMap<String, String> {
        self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decorate `message` with this task's `sessionId`/`auctionId` and
    /// write it to every bound client.
    pub async fn broadcast(&self, mut message: Message) {
        message = message
            .with_field("sessionId", self.session_id.to_string())
            .with_field("auctionId", self.task_id.to_string());
        for client in self.clients {
            if let Err(err) = client.send(&message).await {
                debug!(
                    task_id = self.task_id,
                    client_id = client.id(),
                    error = %err,
                    "failed to write outbound message to client"
                );
            }
        }
    }

    /// `RUNNING -> ENDABLE`.
    pub fn mark_endable(&self) -> bool {
        self.lifecycle.mark_endable()
    }

    /// `ENDABLE -> RUNNING`, e.g. a qualifying late bid extends the clock.
    pub fn resume(&self) -> bool {
        self.lifecycle.resume()
    }
}
