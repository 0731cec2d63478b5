//! # ProcessActor: single owner of one process.
//!
//! Every supervised process is driven by one actor task. The actor owns the
//! [`ProcessRecord`] and is the only code that mutates it; everything else talks
//! to it through a command queue and reads the [`ProcessInfo`] snapshots it
//! publishes on a `watch` channel.
//!
//! ## Wake-ups
//! ```text
//! loop select! {
//!   ├─► command (Start / Stop / Restart)     ──► request_start / stop
//!   ├─► child exit                           ──► Crashed ─► RestartPolicy
//!   ├─► dependencies ready / dead end        ──► launch / Failed("dependency not ready")
//!   ├─► start timeout                        ──► Failed("dependency not ready")
//!   ├─► restart timer                        ──► Starting ─► Running | Failed
//!   ├─► health verdict                       ──► HealthChanged (+ stability / unhealthy timers)
//!   ├─► stability window elapsed             ──► RestartCounterReset
//!   ├─► unhealthy grace elapsed              ──► Stopping ─► Crashed ─► RestartPolicy
//!   ├─► shutdown requested                   ──► cancel pending start, restart timer, probes
//!   └─► runtime cancelled / queue closed     ──► exit (a live child is killed on drop)
//! }
//! ```
//!
//! ## Rules
//! - Transitions of one process are serialized; different processes never wait on
//!   each other except through dependency snapshots.
//! - The snapshot is updated **before** the matching event is published, so a
//!   receiver reacting to an event observes at least that state.
//! - A stop runs inline (TERM, grace, KILL); commands queued meanwhile wait.
//! - An automatic restart does not wait for dependencies again.

use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::record::ProcessRecord;
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::health::{HealthChecker, HealthReport, HealthStatus, ProbeContext};
use crate::policies::{RestartDecision, RestartPolicy};
use crate::process::{ExitStatus, ProcessConfig, ProcessHandle, ProcessInfo, ProcessState};

/// Reason attached to `Failed` when dependencies never became ready.
pub(crate) const DEPENDENCY_NOT_READY: &str = "dependency not ready";

pub(crate) type StartReply = oneshot::Sender<Result<(), SupervisorError>>;

/// Requests handled by a process actor.
pub(crate) enum Command {
    /// Start the process. `accepted` fires once the request is registered
    /// (spawned, or waiting for dependencies); `reply` once it is settled.
    Start {
        accepted: oneshot::Sender<()>,
        reply: StartReply,
    },
    /// Stop the process; `force` skips the remaining TERM→KILL grace.
    Stop {
        force: CancellationToken,
        reply: oneshot::Sender<()>,
    },
    /// Stop, then start, as one operation.
    Restart { reply: StartReply },
}

/// Effective per-process settings (process overrides merged with supervisor defaults).
#[derive(Clone, Debug)]
pub(crate) struct ActorParams {
    pub policy: RestartPolicy,
    pub stop_grace: Duration,
    pub start_timeout: Option<Duration>,
    pub stability_window: Option<Duration>,
}

enum DepsOutcome {
    Ready,
    DeadEnd(Arc<str>),
}

struct PendingStart {
    waiters: Vec<StartReply>,
    wait: BoxFuture<'static, DepsOutcome>,
    deadline: Option<Instant>,
}

enum Wake {
    Command(Command),
    Closed,
    Shutdown,
    Exited(ExitStatus),
    Deps(DepsOutcome),
    StartTimeout,
    RestartDue,
    Health(HealthReport),
    Stable,
    UnhealthyExpired,
}

pub(crate) struct ProcessActor {
    name: Arc<str>,
    cfg: Arc<ProcessConfig>,
    params: ActorParams,
    record: ProcessRecord,
    /// Snapshots of direct dependencies.
    deps: Vec<watch::Receiver<ProcessInfo>>,
    bus: Bus,
    snapshot: watch::Sender<ProcessInfo>,
    /// Supervisor shutdown: no new starts, no restarts, no probes.
    shutdown: CancellationToken,

    pending: Option<PendingStart>,
    checker: Option<HealthChecker>,
    restart_at: Option<Instant>,
    stable_at: Option<Instant>,
    unhealthy_at: Option<Instant>,
}

impl ProcessActor {
    pub fn new(
        cfg: Arc<ProcessConfig>,
        params: ActorParams,
        deps: Vec<watch::Receiver<ProcessInfo>>,
        bus: Bus,
        snapshot: watch::Sender<ProcessInfo>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: Arc::from(cfg.name.as_str()),
            cfg,
            params,
            record: ProcessRecord::new(),
            deps,
            bus,
            snapshot,
            shutdown,
            pending: None,
            checker: None,
            restart_at: None,
            stable_at: None,
            unhealthy_at: None,
        }
    }

    /// Runs until `runtime` is cancelled or the command queue closes.
    pub async fn run(mut self, mut cmds: mpsc::Receiver<Command>, runtime: CancellationToken) {
        let mut shutdown_seen = false;

        loop {
            let start_deadline = self.pending.as_ref().and_then(|p| p.deadline);
            let wake = tokio::select! {
                _ = runtime.cancelled() => break,
                cmd = cmds.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => Wake::Closed,
                },
                _ = self.shutdown.cancelled(), if !shutdown_seen => Wake::Shutdown,
                status = child_exit(&mut self.record.handle) => Wake::Exited(status),
                outcome = deps_settled(&mut self.pending) => Wake::Deps(outcome),
                _ = sleep_until_opt(start_deadline) => Wake::StartTimeout,
                _ = sleep_until_opt(self.restart_at) => Wake::RestartDue,
                report = health_changed(&mut self.checker) => Wake::Health(report),
                _ = sleep_until_opt(self.stable_at) => Wake::Stable,
                _ = sleep_until_opt(self.unhealthy_at) => Wake::UnhealthyExpired,
            };

            match wake {
                Wake::Command(cmd) => self.handle_command(cmd).await,
                Wake::Closed => break,
                Wake::Shutdown => {
                    shutdown_seen = true;
                    self.on_shutdown();
                }
                Wake::Exited(status) => self.on_exit(status),
                Wake::Deps(DepsOutcome::Ready) => self.settle_pending(Ok(())),
                Wake::Deps(DepsOutcome::DeadEnd(dep)) => {
                    warn!(
                        process = %self.name,
                        dependency = %dep,
                        "dependency will not become ready"
                    );
                    self.settle_pending(Err(DEPENDENCY_NOT_READY.to_string()));
                }
                Wake::StartTimeout => {
                    warn!(
                        process = %self.name,
                        timeout = ?self.params.start_timeout,
                        "timed out waiting for dependencies"
                    );
                    self.settle_pending(Err(DEPENDENCY_NOT_READY.to_string()));
                }
                Wake::RestartDue => self.on_restart_due(),
                Wake::Health(report) => self.on_health(report),
                Wake::Stable => self.on_stable(),
                Wake::UnhealthyExpired => self.on_unhealthy_expired().await,
            }
        }

        self.cancel_pending(SupervisorError::ShuttingDown);
        if let Some(handle) = self.record.handle.take() {
            debug!(
                process = %self.name,
                pid = ?handle.pid(),
                "actor exiting; killing live process"
            );
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { accepted, reply } => {
                self.request_start(reply);
                let _ = accepted.send(());
            }
            Command::Stop { force, reply } => {
                self.stop(&force).await;
                let _ = reply.send(());
            }
            Command::Restart { reply } => {
                if self.shutdown.is_cancelled() {
                    let _ = reply.send(Err(SupervisorError::ShuttingDown));
                    return;
                }
                self.stop(&CancellationToken::new()).await;
                self.request_start(reply);
            }
        }
    }

    fn request_start(&mut self, reply: StartReply) {
        if self.shutdown.is_cancelled() {
            let _ = reply.send(Err(SupervisorError::ShuttingDown));
            return;
        }
        if self.record.state.is_active() {
            let _ = reply.send(Ok(()));
            return;
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.waiters.push(reply);
            return;
        }

        // Manual start: fresh restart budget.
        self.restart_at = None;
        if self.record.restart_count > 0 {
            self.record.reset_restarts();
        }

        if self.deps.is_empty() {
            let _ = reply.send(self.launch());
            return;
        }

        debug!(process = %self.name, "start waiting for dependencies");
        self.pending = Some(PendingStart {
            waiters: vec![reply],
            wait: Box::pin(wait_for_deps(self.deps.clone())),
            deadline: self.params.start_timeout.map(|t| Instant::now() + t),
        });
        self.publish_snapshot();
    }

    fn settle_pending(&mut self, outcome: Result<(), String>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let result = match outcome {
            Ok(()) => self.launch(),
            Err(reason) => {
                self.set_state(ProcessState::Failed {
                    reason: reason.clone(),
                });
                Err(SupervisorError::StartFailed {
                    process: self.name.to_string(),
                    reason,
                })
            }
        };
        for waiter in pending.waiters {
            let _ = waiter.send(result.clone());
        }
    }

    fn cancel_pending(&mut self, err: SupervisorError) {
        if let Some(pending) = self.pending.take() {
            debug!(process = %self.name, reason = err.as_label(), "pending start cancelled");
            for waiter in pending.waiters {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    /// `Starting` → spawn → `Running`, or `Failed` if the OS refuses.
    fn launch(&mut self) -> Result<(), SupervisorError> {
        self.set_state(ProcessState::Starting);

        match ProcessHandle::spawn(&self.cfg, &self.bus) {
            Ok(handle) => {
                info!(process = %self.name, pid = ?handle.pid(), "process started");
                self.record.handle = Some(handle);
                self.record.started_at = Some(SystemTime::now());
                self.set_state(ProcessState::Running);

                match &self.cfg.health_check {
                    Some(check) => {
                        self.checker = Some(HealthChecker::spawn(
                            self.name.clone(),
                            check.clone(),
                            ProbeContext::from_config(&self.cfg),
                            &self.shutdown,
                        ));
                    }
                    None => self.set_health(HealthStatus::Healthy, None),
                }
                Ok(())
            }
            Err(e) => {
                warn!(process = %self.name, error = %e, label = e.as_label(), "spawn failed");
                let reason = format!("spawn failed: {}", e.source);
                self.set_state(ProcessState::Failed {
                    reason: reason.clone(),
                });
                Err(SupervisorError::StartFailed {
                    process: self.name.to_string(),
                    reason,
                })
            }
        }
    }

    async fn stop(&mut self, force: &CancellationToken) {
        self.cancel_pending(SupervisorError::Cancelled {
            process: self.name.to_string(),
        });
        self.restart_at = None;

        match self.record.state {
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping => {
                info!(process = %self.name, "stopping process");
                let status = self.terminate(force).await;
                debug!(process = %self.name, status = ?status, "process stopped");
                self.set_state(ProcessState::Stopped);
            }
            ProcessState::Crashed { .. } => self.set_state(ProcessState::Stopped),
            ProcessState::Stopped | ProcessState::Failed { .. } => self.publish_snapshot(),
        }
    }

    /// `Stopping`, TERM → grace → KILL, wait. Leaves the record handle-free.
    async fn terminate(&mut self, force: &CancellationToken) -> Option<ExitStatus> {
        self.set_state(ProcessState::Stopping);
        self.leave_running();

        let grace = self.params.stop_grace;
        let status = match self.record.handle.as_mut() {
            Some(handle) => Some(handle.terminate(grace, force).await),
            None => None,
        };
        self.record.handle = None;
        if status.is_some() {
            self.record.last_exit = status;
        }
        self.set_health(HealthStatus::Unknown, None);
        status
    }

    fn on_exit(&mut self, status: ExitStatus) {
        self.record.handle = None;
        self.record.last_exit = Some(status);
        self.leave_running();
        warn!(process = %self.name, %status, "process exited unexpectedly");
        self.set_health(HealthStatus::Unknown, None);
        // exits observed once shutdown began were requested by the supervisor
        self.crashed(status, self.shutdown.is_cancelled());
    }

    /// Records the crash and applies the restart policy.
    ///
    /// The restart timer is armed before the `Crashed` snapshot goes out, so
    /// dependents never mistake a restarting process for a dead end.
    fn crashed(&mut self, status: ExitStatus, deliberate: bool) {
        let exit_code = status.code;
        let decision = self
            .params
            .policy
            .decide(self.record.restart_count, deliberate);

        match decision {
            RestartDecision::Restart { after } => {
                let attempt = self.record.record_restart(after, exit_code);
                self.restart_at = Some(Instant::now() + after);
                self.set_state(ProcessState::Crashed { exit_code });
                info!(process = %self.name, attempt, delay = ?after, "restart scheduled");
                self.bus.publish(
                    Event::new(EventKind::RestartScheduled)
                        .with_process(self.name.clone())
                        .with_attempt(attempt)
                        .with_delay(after)
                        .with_exit_code(exit_code),
                );
            }
            RestartDecision::GiveUp { reason } => {
                self.set_state(ProcessState::Crashed { exit_code });
                warn!(
                    process = %self.name,
                    restarts = self.record.restart_count,
                    %reason,
                    "giving up"
                );
                self.set_state(ProcessState::Failed { reason });
            }
            RestartDecision::Stay => self.set_state(ProcessState::Crashed { exit_code }),
        }
    }

    fn on_restart_due(&mut self) {
        self.restart_at = None;
        let crashed = matches!(self.record.state, ProcessState::Crashed { .. });
        if crashed && !self.shutdown.is_cancelled() {
            if let Err(e) = self.launch() {
                debug!(process = %self.name, error = %e, "automatic restart failed");
            }
        } else {
            self.publish_snapshot();
        }
    }

    fn on_health(&mut self, report: HealthReport) {
        if self.record.state == ProcessState::Running {
            self.set_health(report.status, report.error);
        }
    }

    fn on_stable(&mut self) {
        self.stable_at = None;
        if !self.is_running_with(HealthStatus::Healthy) {
            return;
        }
        let previous = self.record.reset_restarts();
        if previous == 0 {
            return;
        }
        info!(process = %self.name, restarts = previous, "process stable; restart counter reset");
        self.publish_snapshot();
        self.bus.publish(
            Event::new(EventKind::RestartCounterReset)
                .with_process(self.name.clone())
                .with_attempt(previous),
        );
    }

    /// Unhealthy for longer than the grace: stop it and treat the exit as a crash.
    async fn on_unhealthy_expired(&mut self) {
        self.unhealthy_at = None;
        if !self.is_running_with(HealthStatus::Unhealthy) {
            return;
        }
        warn!(process = %self.name, "process unhealthy past grace; stopping");
        let status = self
            .terminate(&CancellationToken::new())
            .await
            .unwrap_or_default();
        self.crashed(status, false);
    }

    fn on_shutdown(&mut self) {
        self.cancel_pending(SupervisorError::ShuttingDown);
        self.restart_at = None;
        self.checker = None;
        self.stable_at = None;
        self.unhealthy_at = None;
        self.publish_snapshot();
    }

    fn is_running_with(&self, health: HealthStatus) -> bool {
        self.record.state == ProcessState::Running && self.record.health == health
    }

    /// Drops everything tied to the current run (probes, readiness timers).
    fn leave_running(&mut self) {
        self.checker = None;
        self.stable_at = None;
        self.unhealthy_at = None;
    }

    fn set_state(&mut self, next: ProcessState) {
        let prev = std::mem::replace(&mut self.record.state, next.clone());
        debug!(process = %self.name, from = prev.as_label(), to = next.as_label(), "state changed");
        self.publish_snapshot();
        self.bus
            .publish(Event::state_changed(self.name.clone(), prev, next));
    }

    fn set_health(&mut self, status: HealthStatus, error: Option<Arc<str>>) {
        if self.record.health == status {
            return;
        }
        self.record.health = status;
        self.stable_at = None;
        self.unhealthy_at = None;

        if self.record.state == ProcessState::Running {
            match status {
                HealthStatus::Healthy if self.record.restart_count > 0 => {
                    self.stable_at = self.params.stability_window.map(|w| Instant::now() + w);
                }
                HealthStatus::Unhealthy => {
                    self.unhealthy_at = self
                        .cfg
                        .health_check
                        .as_ref()
                        .and_then(|c| c.unhealthy_grace)
                        .map(|g| Instant::now() + g);
                }
                _ => {}
            }
        }

        debug!(process = %self.name, health = status.as_label(), "health changed");
        self.publish_snapshot();
        let mut ev = Event::new(EventKind::HealthChanged)
            .with_process(self.name.clone())
            .with_health(status);
        if let Some(error) = error {
            ev = ev.with_reason(error);
        }
        self.bus.publish(ev);
    }

    fn publish_snapshot(&self) {
        let info = self
            .record
            .snapshot(&self.name, self.pending.is_some(), self.restart_at.is_some());
        self.snapshot.send_replace(info);
    }
}

/// Resolves once every dependency is ready at the same time, or one of them is a dead end.
async fn wait_for_deps(mut deps: Vec<watch::Receiver<ProcessInfo>>) -> DepsOutcome {
    loop {
        for rx in deps.iter_mut() {
            let seen = rx
                .wait_for(|info| info.is_ready() || info.is_dead_end())
                .await
                .map(|info| info.is_dead_end().then(|| info.name.clone()));
            match seen {
                Ok(Some(dep)) => return DepsOutcome::DeadEnd(dep),
                Ok(None) => {}
                Err(_closed) => return pending().await,
            }
        }
        if deps.iter().all(|rx| rx.borrow().is_ready()) {
            return DepsOutcome::Ready;
        }
    }
}

async fn child_exit(handle: &mut Option<ProcessHandle>) -> ExitStatus {
    match handle {
        Some(handle) => handle.wait().await,
        None => pending().await,
    }
}

async fn deps_settled(pending_start: &mut Option<PendingStart>) -> DepsOutcome {
    match pending_start {
        Some(p) => (&mut p.wait).await,
        None => pending().await,
    }
}

async fn health_changed(checker: &mut Option<HealthChecker>) -> HealthReport {
    match checker {
        Some(checker) => checker.changed().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, state: ProcessState, health: HealthStatus) -> ProcessInfo {
        let mut info = ProcessInfo::new(Arc::from(name));
        info.state = state;
        info.health = health;
        info
    }

    #[tokio::test]
    async fn deps_ready_when_all_ready() {
        let (db_tx, db_rx) =
            watch::channel(info("db", ProcessState::Stopped, HealthStatus::Unknown));
        let (cache_tx, cache_rx) =
            watch::channel(info("cache", ProcessState::Running, HealthStatus::Healthy));

        let waiter = tokio::spawn(wait_for_deps(vec![db_rx, cache_rx]));
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        db_tx.send_replace(info("db", ProcessState::Running, HealthStatus::Healthy));
        let outcome = time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(matches!(outcome, DepsOutcome::Ready));
        drop(cache_tx);
    }

    #[tokio::test]
    async fn failed_dependency_is_a_dead_end() {
        let (db_tx, db_rx) =
            watch::channel(info("db", ProcessState::Starting, HealthStatus::Unknown));
        let waiter = tokio::spawn(wait_for_deps(vec![db_rx]));

        db_tx.send_replace(info(
            "db",
            ProcessState::Failed {
                reason: "spawn failed".into(),
            },
            HealthStatus::Unknown,
        ));
        let outcome = time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(matches!(outcome, DepsOutcome::DeadEnd(name) if &*name == "db"));
    }

    #[tokio::test]
    async fn restarting_dependency_is_not_a_dead_end() {
        let mut crashed = info(
            "db",
            ProcessState::Crashed { exit_code: Some(1) },
            HealthStatus::Unknown,
        );
        crashed.restart_scheduled = true;
        let (db_tx, db_rx) = watch::channel(crashed);
        let waiter = tokio::spawn(wait_for_deps(vec![db_rx]));

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        db_tx.send_replace(info("db", ProcessState::Running, HealthStatus::Healthy));
        let outcome = time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(matches!(outcome, DepsOutcome::Ready));
    }

    struct Running {
        cmds: mpsc::Sender<Command>,
        info: watch::Receiver<ProcessInfo>,
        runtime: CancellationToken,
    }

    fn spawn_actor(cfg: ProcessConfig, shutdown: CancellationToken) -> Running {
        let cfg = Arc::new(cfg);
        let params = ActorParams {
            policy: RestartPolicy::from_config(&cfg),
            stop_grace: Duration::from_secs(1),
            start_timeout: None,
            stability_window: None,
        };
        let (snap_tx, info) = watch::channel(ProcessInfo::new(Arc::from(cfg.name.as_str())));
        let actor = ProcessActor::new(cfg, params, Vec::new(), Bus::new(64), snap_tx, shutdown);

        let (cmds, cmd_rx) = mpsc::channel(8);
        let runtime = CancellationToken::new();
        tokio::spawn(actor.run(cmd_rx, runtime.clone()));
        Running {
            cmds,
            info,
            runtime,
        }
    }

    async fn start(cmds: &mpsc::Sender<Command>) -> Result<(), SupervisorError> {
        let (accepted, _) = oneshot::channel();
        let (reply, rx) = oneshot::channel();
        cmds.send(Command::Start { accepted, reply }).await.unwrap();
        rx.await.unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_failure_fails_without_retry() {
        let actor = spawn_actor(
            ProcessConfig::new("ghost", "procvisor-no-such-binary")
                .with_auto_restart(true)
                .with_restart_delay(Duration::from_millis(10)),
            CancellationToken::new(),
        );

        let err = start(&actor.cmds).await.unwrap_err();
        assert_eq!(err.as_label(), "supervisor_start_failed");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let info = actor.info.borrow().clone();
        assert!(matches!(
            info.state,
            ProcessState::Failed { ref reason } if reason.starts_with("spawn failed")
        ));
        assert!(!info.restart_scheduled);
        actor.runtime.cancel();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_during_shutdown_is_not_restarted() {
        let shutdown = CancellationToken::new();
        let mut actor = spawn_actor(
            ProcessConfig::new("worker", "sh")
                .with_args(["-c", "sleep 0.3; exit 1"])
                .with_auto_restart(true)
                .with_restart_delay(Duration::from_millis(10)),
            shutdown.clone(),
        );

        start(&actor.cmds).await.unwrap();
        shutdown.cancel();

        time::timeout(
            Duration::from_secs(3),
            actor
                .info
                .wait_for(|i| matches!(i.state, ProcessState::Crashed { .. })),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let info = actor.info.borrow().clone();
        assert_eq!(info.state, ProcessState::Crashed { exit_code: Some(1) });
        assert!(!info.restart_scheduled);
        assert_eq!(info.restart_count, 0);
        actor.runtime.cancel();
    }
}
