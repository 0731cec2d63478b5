//! # Supervisor: control surface over the process actors.
//!
//! The [`Supervisor`] owns the event bus, the dependency graph and the registry of
//! process actors. Control operations are translated into actor commands; queries
//! read the actors' snapshots.
//!
//! ## High-level architecture
//! ```text
//! Supervisor::load(cfg, processes)
//!   ├─ ProcessConfig::validate() + DependencyGraph::new()   (ConfigError → nothing spawned)
//!   ├─ Registry::spawn(): one ProcessActor per process
//!   └─ subscriber listener: Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!
//! start_all():  Start → every actor in start order (each registered before the next)
//!               actors wait on their dependencies' snapshots, then spawn
//! stop_all():   per process: wait until every dependent is handle-free, then Stop
//!               whole operation bounded by cfg.grace; past it: force-kill, GraceExceeded
//!
//! Shutdown path:
//!   shutdown() / run_until_signal()
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► shutdown_token.cancel()  → pending starts, restart timers and probes cancelled
//!     └─► stop_all()               → AllStoppedWithin | GraceExceeded
//!     └─► runtime_token.cancel()   → actors exit, listener drains subscribers
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use procvisor::{HealthCheckConfig, ProcessConfig, Probe, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let processes = vec![
//!         ProcessConfig::new("db", "postgres")
//!             .with_health_check(HealthCheckConfig::new(Probe::tcp("127.0.0.1", 5432))),
//!         ProcessConfig::new("api", "cargo")
//!             .with_args(["run", "--bin", "api"])
//!             .with_depends_on(["db"])
//!             .with_auto_restart(true)
//!             .with_max_restarts(3)
//!             .with_start_timeout(Duration::from_secs(30)),
//!     ];
//!
//!     let sup = Supervisor::load(SupervisorConfig::default(), processes)?;
//!     sup.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::builder::SupervisorBuilder;
use crate::core::registry::{ActorHandle, Registry};
use crate::core::{SupervisorConfig, shutdown};
use crate::error::{ConfigError, SupervisorError};
use crate::events::{Bus, Event, EventKind};
use crate::graph::DependencyGraph;
use crate::process::{ProcessConfig, ProcessInfo, ProcessState};

/// Orchestrates a set of named, interdependent child processes.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    graph: DependencyGraph,
    registry: Registry,
    /// Cancelled when shutdown begins: no new starts, restarts or probes.
    shutdown_token: CancellationToken,
    /// Cancelled when shutdown ends: actors and the subscriber listener exit.
    runtime_token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Validates the configuration and spawns one actor per process (all `Stopped`).
    ///
    /// Must be called inside a tokio runtime.
    pub fn load(
        cfg: SupervisorConfig,
        processes: Vec<ProcessConfig>,
    ) -> Result<Arc<Self>, ConfigError> {
        SupervisorBuilder::new(cfg).build(processes)
    }

    /// Starts a builder (to attach callback subscribers).
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        graph: DependencyGraph,
        registry: Registry,
        shutdown_token: CancellationToken,
        runtime_token: CancellationToken,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            cfg,
            bus,
            graph,
            registry,
            shutdown_token,
            runtime_token,
            listener: Mutex::new(listener),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// New receiver of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn start_order(&self) -> Vec<&str> {
        self.graph.start_order()
    }

    pub fn stop_order(&self) -> Vec<&str> {
        self.graph.stop_order()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Current state of one process.
    pub fn get_state(&self, name: &str) -> Result<ProcessState, SupervisorError> {
        Ok(self.actor(name)?.info().state)
    }

    /// Full snapshot of one process.
    pub fn info(&self, name: &str) -> Result<ProcessInfo, SupervisorError> {
        Ok(self.actor(name)?.info())
    }

    /// Snapshots of all processes in declaration order.
    pub fn list(&self) -> Vec<ProcessInfo> {
        self.registry.iter().map(ActorHandle::info).collect()
    }

    /// Starts one process once its dependencies are ready.
    ///
    /// Returns when the process is `Running`. Every dependency must already be
    /// running or on its way there, otherwise the call is rejected with
    /// [`SupervisorError::DependencyNotStarted`].
    pub async fn start(&self, name: &str) -> Result<(), SupervisorError> {
        self.ensure_accepting()?;
        let actor = self.actor(name)?;
        self.ensure_dependencies_started(name)?;
        actor.start().await
    }

    /// Stops one process (TERM, per-process grace, KILL). Idempotent.
    ///
    /// Dependents are left running.
    pub async fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        self.actor(name)?.stop(CancellationToken::new()).await;
        Ok(())
    }

    /// Stop followed by start, serialized inside the process actor.
    pub async fn restart(&self, name: &str) -> Result<(), SupervisorError> {
        self.ensure_accepting()?;
        let actor = self.actor(name)?;
        self.ensure_dependencies_started(name)?;
        actor.restart().await
    }

    /// Starts every process in dependency order.
    ///
    /// Independent processes come up concurrently; each dependent waits until all
    /// of its dependencies are `Running` and `Healthy`. Failures of some processes
    /// do not stop the others; they are reported together in declaration order.
    pub async fn start_all(&self) -> Result<(), SupervisorError> {
        self.ensure_accepting()?;

        let mut tickets = Vec::with_capacity(self.graph.len());
        for name in self.graph.start_order() {
            let actor = self.actor(name)?;
            tickets.push((actor, actor.submit_start().await?));
        }

        let results = join_all(
            tickets
                .into_iter()
                .map(|(actor, ticket)| async move { (actor.name(), actor.settle(ticket).await) }),
        )
        .await;

        let mut failed = HashSet::new();
        for (name, res) in results {
            if let Err(e) = res {
                warn!(process = name, error = %e, "process did not start");
                failed.insert(name);
            }
        }
        if failed.is_empty() {
            return Ok(());
        }
        let failed = self
            .registry
            .iter()
            .map(ActorHandle::name)
            .filter(|n| failed.contains(n))
            .map(str::to_string)
            .collect();
        Err(SupervisorError::StartAllFailed { failed })
    }

    /// Stops every process in reverse dependency order.
    ///
    /// A process is signalled only after all of its dependents hold no OS handle;
    /// unrelated branches stop concurrently. If the whole operation exceeds
    /// [`SupervisorConfig::grace`], every remaining process is killed and
    /// [`SupervisorError::GraceExceeded`] is returned.
    pub async fn stop_all(&self) -> Result<(), SupervisorError> {
        let force = CancellationToken::new();
        let order = self.graph.stop_order();

        let mut done_tx = Vec::with_capacity(order.len());
        let mut done_rx: HashMap<&str, watch::Receiver<bool>> = HashMap::with_capacity(order.len());
        for name in &order {
            let (tx, rx) = watch::channel(false);
            done_tx.push(tx);
            done_rx.insert(*name, rx);
        }

        let done_rx = &done_rx;
        let stops = order.iter().zip(done_tx).map(|(&name, done)| {
            let force = force.clone();
            async move {
                for dependent in self.graph.dependents(name) {
                    if let Some(rx) = done_rx.get(dependent) {
                        let mut rx = rx.clone();
                        let _ = rx.wait_for(|stopped| *stopped).await;
                    }
                }
                if let Some(actor) = self.registry.get(name) {
                    actor.stop(force).await;
                }
                done.send_replace(true);
            }
        });
        let all = join_all(stops);
        tokio::pin!(all);

        let grace = self.cfg.grace;
        if time::timeout(grace, &mut all).await.is_ok() {
            return Ok(());
        }

        let stuck: Vec<String> = order
            .iter()
            .filter(|name| done_rx.get(*name).is_some_and(|rx| !*rx.borrow()))
            .filter(|name| self.registry.get(name).is_some_and(|a| a.info().state.is_active()))
            .map(|name| name.to_string())
            .collect();
        warn!(?grace, ?stuck, "stop deadline exceeded; killing remaining processes");
        force.cancel();
        all.await;

        self.bus
            .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")));
        Err(SupervisorError::GraceExceeded { grace, stuck })
    }

    /// Graceful shutdown: cancel pending work, stop everything in order, release the actors.
    ///
    /// Calling it again after completion is a no-op returning `Ok(())`.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        if self.runtime_token.is_cancelled() {
            return Ok(());
        }
        if !self.shutdown_token.is_cancelled() {
            info!("shutdown requested");
            self.bus.publish(Event::new(EventKind::ShutdownRequested));
            self.shutdown_token.cancel();
        }

        let res = self.stop_all().await;
        if res.is_ok() {
            info!("all processes stopped within grace");
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
        }

        self.runtime_token.cancel();
        self.registry.join_all().await;
        if let Some(listener) = self.listener.lock().await.take() {
            if time::timeout(self.cfg.grace, listener).await.is_err() {
                warn!("subscribers did not drain within grace");
            }
        }
        res
    }

    /// Starts everything, waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down.
    ///
    /// Processes that fail to start are logged; the rest keep running until the signal.
    pub async fn run_until_signal(&self) -> Result<(), SupervisorError> {
        if let Err(e) = self.start_all().await {
            warn!(error = %e, "not every process started");
        }
        if let Err(e) = shutdown::wait_for_shutdown_signal().await {
            warn!(error = %e, "cannot listen for signals; shutting down");
        }
        self.shutdown().await
    }

    fn actor(&self, name: &str) -> Result<&ActorHandle, SupervisorError> {
        self.registry
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownProcess {
                name: name.to_string(),
            })
    }

    fn ensure_accepting(&self) -> Result<(), SupervisorError> {
        if self.is_shutting_down() {
            Err(SupervisorError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn ensure_dependencies_started(&self, name: &str) -> Result<(), SupervisorError> {
        for dep in self.graph.dependencies(name) {
            let info = self.actor(dep)?.info();
            if !info.is_ready() && !info.is_progressing() {
                return Err(SupervisorError::DependencyNotStarted {
                    process: name.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Drop for Supervisor {
    /// Actors exit and kill any live child.
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        self.runtime_token.cancel();
    }
}
