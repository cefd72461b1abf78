//! The auction task run loop (core component #3): consumes queued lines,
//! dispatches by message type, and drives the embedded [`Lifecycle`]
//! through its states per §4.2.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use auction_shared::codec::decode;
use auction_shared::{
    ClientSession, Lifecycle, Message, SessionId, SharedResult, StateLock, TaskHandle, TaskId,
    TaskMailbox, TaskState,
};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::context::TaskContext;

const MAILBOX_POLL: Duration = Duration::from_millis(50);
const DEFAULT_END_GRACE: Duration = Duration::from_secs(5);

use crate::logic::AuctionLogic;

/// A task running a specific [`AuctionLogic`] specialization, composed with
/// the shared [`Lifecycle`] state machine rather than inheriting from it
/// (Design Notes: "favor composition over inheritance").
pub struct AuctionTask<L: AuctionLogic> {
    id: TaskId,
    session_id: SessionId,
    lifecycle: Lifecycle,
    params: HashMap<String, String>,
    clients: RwLock<Vec<Arc<ClientSession>>>,
    mailbox_tx: mpsc::UnboundedSender<String>,
    mailbox_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    logic: L,
    end_grace: Duration,
    self_ref: Weak<AuctionTask<L>>,
}

impl<L: AuctionLogic> AuctionTask<L> {
    pub fn new(
        id: TaskId,
        session_id: SessionId,
        params: HashMap<String, String>,
        clients: Vec<Arc<ClientSession>>,
        logic: L,
    ) -> Arc<Self> {
        Self::with_end_grace(id, session_id, params, clients, logic, DEFAULT_END_GRACE)
    }

    pub fn with_end_grace(
        id: TaskId,
        session_id: SessionId,
        params: HashMap<String, String>,
        clients: Vec<Arc<ClientSession>>,
        logic: L,
        end_grace: Duration,
    ) -> Arc<Self> {
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|self_ref| Self {
            id,
            session_id,
            lifecycle: Lifecycle::new(),
            params,
            clients: RwLock::new(clients),
            mailbox_tx,
            mailbox_rx: Mutex::new(mailbox_rx),
            logic,
            end_grace,
            self_ref: self_ref.clone(),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.lifecycle.state()
    }

    async fn clients_snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.clients.read().await.clone()
    }

    fn context<'a>(&'a self, clients: &'a [Arc<ClientSession>]) -> TaskContext<'a> {
        TaskContext {
            task_id: self.id,
            session_id: self.session_id,
            params: &self.params,
            lifecycle: &self.lifecycle,
            clients,
        }
    }

    fn mailbox_handle(self: &Arc<Self>) -> Arc<dyn TaskMailbox> {
        self.clone()
    }

    /// The run loop proper (§4.2). Single-shot: a second call on an
    /// already-started task returns immediately.
    pub async fn run(self: Arc<Self>) {
        if self.lifecycle.state() != TaskState::New {
            return;
        }
        if !self.lifecycle.start() {
            return;
        }

        let clients = self.clients_snapshot().await;
        for client in &clients {
            client.register(self.mailbox_handle()).await;
        }

        {
            let ctx = self.context(&clients);
            self.logic.initialize(&ctx).await;
        }

        let mut mailbox = self.mailbox_rx.lock().await;
        while !matches!(self.lifecycle.state(), TaskState::Ending | TaskState::Ended) {
            match tokio::time::timeout(MAILBOX_POLL, mailbox.recv()).await {
                Ok(Some(line)) => {
                    let clients = self.clients_snapshot().await;
                    let ctx = self.context(&clients);
                    self.dispatch_line(&line, &ctx).await;
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    let clients = self.clients_snapshot().await;
                    let ctx = self.context(&clients);
                    self.logic.idle(&ctx).await;
                }
            }
        }
        drop(mailbox);

        let clients = self.clients_snapshot().await;
        {
            let ctx = self.context(&clients);
            self.logic.resolve(&ctx).await;
        }
        for client in &clients {
            client.unregister(&self.mailbox_handle()).await;
        }

        tokio::time::sleep(self.end_grace).await;
        self.lifecycle.complete();
    }

    async fn dispatch_line(&self, line: &str, ctx: &TaskContext<'_>) {
        let Some(message) = decode(line) else {
            debug!(task_id = self.id, "dropped empty line");
            return;
        };

        let Some(session_id) = message.get("sessionId") else {
            debug!(task_id = self.id, msg_type = %message.msg_type, "message missing sessionId, dropping");
            return;
        };
        let Some(auction_id) = message.get("auctionId") else {
            debug!(task_id = self.id, msg_type = %message.msg_type, "message missing auctionId, dropping");
            return;
        };

        let (Ok(session_id), Ok(auction_id)) =
            (session_id.parse::<SessionId>(), auction_id.parse::<TaskId>())
        else {
            debug!(task_id = self.id, msg_type = %message.msg_type, "sessionId/auctionId not integers, dropping");
            return;
        };

        if session_id != self.session_id || auction_id != self.id {
            debug!(
                task_id = self.id,
                session_id, auction_id, "message addressed to a different session/auction, dropping"
            );
            return;
        }

        if !self.logic.handles(&message.msg_type) {
            debug!(task_id = self.id, msg_type = %message.msg_type, "no handler registered, dropping");
            return;
        }

        let mut fields = message.fields.clone();
        fields.remove("sessionId");
        fields.remove("auctionId");

        if let Err(err) = self.logic.handle(&message.msg_type, &fields, ctx).await {
            warn!(task_id = self.id, msg_type = %message.msg_type, error = %err, "handler rejected message");
        }
    }
}

impl<L: AuctionLogic> TaskMailbox for AuctionTask<L> {
    fn enqueue(&self, line: String) {
        let _ = self.mailbox_tx.send(line);
    }
}

#[async_trait]
impl<L: AuctionLogic> TaskHandle for AuctionTask<L> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn state(&self) -> TaskState {
        self.lifecycle.state()
    }

    fn set_state_lock(&self, lock: StateLock) -> SharedResult<()> {
        self.lifecycle.set_state_lock(lock)
    }

    fn try_end(&self) -> bool {
        self.lifecycle.try_end()
    }

    async fn wait_for_end(&self) {
        self.lifecycle.wait_for_end().await
    }

    async fn send_spec(&self) {
        let clients = self.clients_snapshot().await;
        let ctx = self.context(&clients);
        let mut message = Message::new("auction");
        for (key, value) in &self.params {
            message = message.with_field(key.clone(), value.clone());
        }
        info!(task_id = self.id, "broadcasting auction spec");
        ctx.broadcast(message).await;
    }

    fn spawn_run(&self) {
        let Some(arc) = self.self_ref.upgrade() else {
            warn!(task_id = self.id, "spawn_run called on a task with no surviving Arc");
            return;
        };
        tokio::spawn(arc.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerResult;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopLogic {
        idle_calls: AtomicUsize,
    }

    #[async_trait]
    impl AuctionLogic for NoopLogic {
        async fn initialize(&self, ctx: &TaskContext<'_>) {
            ctx.mark_endable();
        }

        async fn idle(&self, _ctx: &TaskContext<'_>) {
            self.idle_calls.fetch_add(1, Ordering::SeqCst);
        }

        async fn resolve(&self, _ctx: &TaskContext<'_>) {}

        fn handles(&self, msg_type: &str) -> bool {
            msg_type == "ping"
        }

        async fn handle(
            &self,
            _msg_type: &str,
            _args: &BTreeMap<String, String>,
            _ctx: &TaskContext<'_>,
        ) -> WorkerResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_transitions_new_to_ended_with_no_dependents() {
        let logic = NoopLogic { idle_calls: AtomicUsize::new(0) };
        let task = AuctionTask::with_end_grace(
            1,
            1,
            HashMap::new(),
            Vec::new(),
            logic,
            Duration::from_millis(1),
        );

        assert_eq!(task.state(), TaskState::New);
        task.clone().run().await;
        assert_eq!(task.state(), TaskState::Ended);
    }

    #[tokio::test]
    async fn second_run_call_is_a_no_op() {
        let logic = NoopLogic { idle_calls: AtomicUsize::new(0) };
        let task = AuctionTask::with_end_grace(
            1,
            1,
            HashMap::new(),
            Vec::new(),
            logic,
            Duration::from_millis(1),
        );
        task.clone().run().await;
        assert_eq!(task.state(), TaskState::Ended);
        task.clone().run().await;
        assert_eq!(task.state(), TaskState::Ended);
    }

    #[tokio::test]
    async fn mismatched_session_or_auction_id_is_dropped_without_side_effects() {
        struct RecordingLogic {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl AuctionLogic for RecordingLogic {
            async fn initialize(&self, _ctx: &TaskContext<'_>) {}
            async fn idle(&self, _ctx: &TaskContext<'_>) {}
            async fn resolve(&self, _ctx: &TaskContext<'_>) {}
            fn handles(&self, msg_type: &str) -> bool {
                msg_type == "bid"
            }
            async fn handle(
                &self,
                _msg_type: &str,
                _args: &BTreeMap<String, String>,
                _ctx: &TaskContext<'_>,
            ) -> WorkerResult<()> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let logic = RecordingLogic { calls: AtomicUsize::new(0) };
        let task =
            AuctionTask::with_end_grace(1, 1, HashMap::new(), Vec::new(), logic, Duration::from_millis(1));

        let runner = tokio::spawn(task.clone().run());
        tokio::task::yield_now().await;

        // Enqueue directly, bypassing a real client connection. sessionId=2
        // does not match this task's session_id=1, so it must be dropped.
        task.mailbox_tx.send("bid sessionId=2 auctionId=1 bidder=a bid=5".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        task.lifecycle.mark_endable();
        task.lifecycle.try_end();

        tokio::time::timeout(Duration::from_secs(1), runner).await.unwrap().unwrap();

        assert_eq!(task.logic.calls.load(Ordering::SeqCst), 0);
    }
}
