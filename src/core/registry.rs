//! # Process registry: name → actor handle.
//!
//! Built once when the supervisor loads; read-only afterwards, so lookups take
//! no lock. Each entry holds the actor's command queue and its snapshot receiver.
//!
//! ## Wiring
//! ```text
//! for each process (declaration order):  watch::channel(ProcessInfo)  ──► snapshot rx
//! for each process:
//!     deps = snapshot rx of every direct dependency
//!     ProcessActor::new(cfg, params, deps, bus, snapshot tx, shutdown)
//!         └─► tokio::spawn(actor.run(cmd rx, runtime.child_token()))
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::SupervisorConfig;
use crate::core::actor::{ActorParams, Command, ProcessActor};
use crate::error::SupervisorError;
use crate::events::Bus;
use crate::graph::DependencyGraph;
use crate::policies::RestartPolicy;
use crate::process::{ProcessConfig, ProcessInfo};

const COMMAND_QUEUE: usize = 32;

/// Settles once the start request has been decided.
pub(crate) type StartTicket = oneshot::Receiver<Result<(), SupervisorError>>;

/// Handle to one process actor.
pub(crate) struct ActorHandle {
    cfg: Arc<ProcessConfig>,
    cmds: mpsc::Sender<Command>,
    info: watch::Receiver<ProcessInfo>,
}

impl ActorHandle {
    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    /// Latest snapshot.
    pub fn info(&self) -> ProcessInfo {
        self.info.borrow().clone()
    }

    /// Queues a start and waits until the actor has registered it.
    pub async fn submit_start(&self) -> Result<StartTicket, SupervisorError> {
        let (accepted, accepted_rx) = oneshot::channel();
        let (reply, ticket) = oneshot::channel();
        self.cmds
            .send(Command::Start { accepted, reply })
            .await
            .map_err(|_| SupervisorError::ShuttingDown)?;
        let _ = accepted_rx.await;
        Ok(ticket)
    }

    pub async fn start(&self) -> Result<(), SupervisorError> {
        let ticket = self.submit_start().await?;
        self.settle(ticket).await
    }

    pub async fn settle(&self, ticket: StartTicket) -> Result<(), SupervisorError> {
        ticket.await.unwrap_or_else(|_| {
            Err(SupervisorError::Cancelled {
                process: self.cfg.name.clone(),
            })
        })
    }

    /// Stops the process; returns once it holds no OS handle.
    pub async fn stop(&self, force: CancellationToken) {
        let (reply, done) = oneshot::channel();
        if self.cmds.send(Command::Stop { force, reply }).await.is_ok() {
            let _ = done.await;
        }
    }

    pub async fn restart(&self) -> Result<(), SupervisorError> {
        let (reply, ticket) = oneshot::channel();
        self.cmds
            .send(Command::Restart { reply })
            .await
            .map_err(|_| SupervisorError::ShuttingDown)?;
        self.settle(ticket).await
    }
}

/// Name → actor map in declaration order.
pub(crate) struct Registry {
    actors: Vec<ActorHandle>,
    index: HashMap<String, usize>,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl Registry {
    /// Spawns one actor per process. Must run inside a tokio runtime.
    pub fn spawn(
        processes: Vec<ProcessConfig>,
        graph: &DependencyGraph,
        cfg: &SupervisorConfig,
        bus: &Bus,
        shutdown: &CancellationToken,
        runtime: &CancellationToken,
    ) -> Self {
        let (senders, receivers): (Vec<_>, Vec<_>) = processes
            .iter()
            .map(|p| watch::channel(ProcessInfo::new(Arc::from(p.name.as_str()))))
            .unzip();
        let index: HashMap<String, usize> = processes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();

        let mut actors = Vec::with_capacity(processes.len());
        let mut joins = Vec::with_capacity(processes.len());

        for (i, (process, snap_tx)) in processes.into_iter().zip(senders).enumerate() {
            let deps = graph
                .dependencies(&process.name)
                .into_iter()
                .filter_map(|d| index.get(d))
                .map(|&j| receivers[j].clone())
                .collect();
            let params = ActorParams {
                policy: RestartPolicy::from_config(&process),
                stop_grace: cfg.stop_grace_for(&process),
                start_timeout: cfg.start_timeout_for(&process),
                stability_window: cfg.stability_window_for(&process),
            };
            let process = Arc::new(process);
            let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);

            let actor = ProcessActor::new(
                Arc::clone(&process),
                params,
                deps,
                bus.clone(),
                snap_tx,
                shutdown.clone(),
            );
            joins.push(tokio::spawn(actor.run(cmd_rx, runtime.child_token())));
            actors.push(ActorHandle {
                cfg: process,
                cmds: cmd_tx,
                info: receivers[i].clone(),
            });
        }

        Self {
            actors,
            index,
            joins: Mutex::new(joins),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ActorHandle> {
        self.index.get(name).map(|&i| &self.actors[i])
    }

    /// Actors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ActorHandle> {
        self.actors.iter()
    }

    /// Waits for every actor task to finish (after runtime cancellation).
    pub async fn join_all(&self) {
        let joins = std::mem::take(&mut *self.joins.lock().await);
        for join in joins {
            if let Err(e) = join.await {
                tracing::warn!(error = %e, "process actor ended abnormally");
            }
        }
    }
}
