//! Coordinator wiring (§4.6): the piece the distilled spec leaves as an
//! external contract. Owns the listener, accepts up to `max_clients` within
//! `max_wait_time`, binds every configured task to the accumulated client
//! set, broadcasts each task's spec, waits a pre-start grace period, then
//! hands the task map to the [`Scheduler`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use auction_shared::{ClientId, ClientSession, TaskHandle, TaskId};
use auction_worker::{AscendingAuction, AuctionTask};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{CoordinatorConfig, TaskConfig};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::scheduler::Scheduler;

/// Builds the concrete task for a configured `type` name. The only
/// registered type today is `"ascending"`; returns `None` for anything
/// else so the caller can report [`crate::config::ConfigError::UnknownTaskType`].
fn build_task(
    config: &TaskConfig,
    session_id: auction_shared::SessionId,
    clients: Vec<Arc<ClientSession>>,
) -> Option<Arc<dyn TaskHandle>> {
    match config.task_type.as_str() {
        "ascending" => {
            Some(AuctionTask::new(config.id, session_id, config.params.clone(), clients, AscendingAuction::new()))
        }
        _ => None,
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    task_configs: Vec<TaskConfig>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, task_configs: Vec<TaskConfig>) -> Self {
        Self { config, task_configs }
    }

    /// Runs the full session lifecycle of §6 to completion. Returns once
    /// the scheduler has driven every task to `ENDED` and every client
    /// socket has been closed.
    pub async fn run(&self) -> CoordinatorResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|source| CoordinatorError::Bind { addr: self.config.bind_addr.clone(), source })?;
        info!(addr = %self.config.bind_addr, max_clients = self.config.max_clients, "coordinator listening");

        let clients = self.accept_clients(&listener).await;
        if clients.is_empty() {
            return Err(CoordinatorError::NoClientsConnected);
        }
        info!(connected = clients.len(), "client acceptance window closed");

        let (scheduler, tasks) = self.build_schedule(clients.clone())?;

        for task in tasks.values() {
            task.send_spec().await;
        }

        tokio::time::sleep(Duration::from_secs(self.config.pre_start_grace_secs)).await;

        scheduler.execute(&tasks).await;

        for client in &clients {
            if let Err(err) = client.shutdown().await {
                warn!(client_id = client.id(), error = %err, "error shutting down client socket");
            }
        }

        Ok(())
    }

    async fn accept_clients(&self, listener: &TcpListener) -> Vec<Arc<ClientSession>> {
        let mut clients = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(self.config.max_wait_time_secs);
        let mut next_client_id: ClientId = 1;

        while clients.len() < self.config.max_clients {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    info!(client_id = next_client_id, %addr, "client connected");
                    let (read_half, write_half) = stream.into_split();
                    let session = ClientSession::new(next_client_id, write_half);
                    let reader = session.clone();
                    tokio::spawn(async move {
                        reader.run_read_loop(read_half).await;
                    });
                    clients.push(session);
                    next_client_id += 1;
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "accept failed, continuing to listen");
                }
                Err(_elapsed) => break,
            }
        }

        clients
    }

    fn build_schedule(
        &self,
        clients: Vec<Arc<ClientSession>>,
    ) -> CoordinatorResult<(Scheduler, HashMap<TaskId, Arc<dyn TaskHandle>>)> {
        let mut scheduler = Scheduler::new();
        for task_config in &self.task_configs {
            if !scheduler.add_task(task_config.id) {
                return Err(CoordinatorError::Config(crate::config::ConfigError::DuplicateTaskId(task_config.id)));
            }
        }
        for task_config in &self.task_configs {
            for dep in &task_config.start_deps {
                scheduler.add_start_depend(task_config.id, *dep)?;
            }
            for dep in &task_config.end_deps {
                scheduler.add_end_depend(task_config.id, *dep)?;
            }
        }

        // Fail fast on a cyclic start graph rather than hanging inside
        // `execute` (§9's open question, resolved towards precheck).
        if scheduler.topological_sort().len() != self.task_configs.len() {
            return Err(CoordinatorError::Config(crate::config::ConfigError::CyclicScheduleGraph));
        }

        let mut tasks: HashMap<TaskId, Arc<dyn TaskHandle>> = HashMap::new();
        for task_config in &self.task_configs {
            let handle = build_task(task_config, self.config.session_id, clients.clone()).ok_or_else(|| {
                CoordinatorError::Config(crate::config::ConfigError::UnknownTaskType {
                    id: task_config.id,
                    type_name: task_config.task_type.clone(),
                })
            })?;
            tasks.insert(task_config.id, handle);
        }

        Ok((scheduler, tasks))
    }
}
