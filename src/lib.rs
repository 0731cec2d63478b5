//! # procvisor
//!
//! **Procvisor** supervises a set of named, interdependent child processes on a
//! developer machine: it starts them in dependency order, watches their health,
//! restarts crashed ones with backoff, and stops everything in reverse order.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//!     │ ProcessConfig │   │ ProcessConfig │   │ ProcessConfig │
//!     │     (db)      │   │  (api → db)   │   │ (web → api)   │
//!     └───────┬───────┘   └───────┬───────┘   └───────┬───────┘
//!             ▼                   ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - DependencyGraph (validated DAG, start/stop order)              │
//! │  - Registry (name → actor handle)                                 │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐     │
//!   │ ProcessActor │   │ ProcessActor │   │ ProcessActor │     │
//!   │ state machine│   │ state machine│   │ state machine│     │
//!   │ + restarts   │   │ + restarts   │   │ + restarts   │     │
//!   └┬─────────────┘   └┬─────────────┘   └┬─────────────┘     │
//!    │ ProcessHandle    │ HealthChecker    │ watch<ProcessInfo>│
//!    │ (child, readers) │ (probe loop)     │ (snapshots)       │
//!    ▼                  ▼                  ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: SupervisorConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber listener   │
//!                       └───────────┬────────────┘
//!                         ┌─────────┼─────────┐
//!                         ▼         ▼         ▼
//!                      worker1   worker2   workerN
//!                         ▼         ▼         ▼
//!                     sub1.on   sub2.on   subN.on
//!                     _event()  _event()  _event()
//! ```
//!
//! ### Process lifecycle
//! ```text
//! Stopped ──start──► Starting ──spawned──► Running ──stop──► Stopping ──► Stopped
//!                       │                     │
//!                       │ deps dead/timeout   │ unexpected exit / unhealthy past grace
//!                       ▼                     ▼
//!                     Failed ◄──give up──── Crashed ──restart delay──► Starting
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                           |
//! |-------------------|--------------------------------------------------------------|----------------------------------------------|
//! | **Supervision**   | Ordered start/stop, restart, queries, shutdown.              | [`Supervisor`], [`SupervisorBuilder`]        |
//! | **Processes**     | Declarative process definitions and runtime snapshots.       | [`ProcessConfig`], [`ProcessInfo`]           |
//! | **Dependencies**  | Validated dependency DAG with deterministic ordering.        | [`DependencyGraph`]                          |
//! | **Health**        | Command, TCP and HTTP probes with thresholds.                | [`HealthCheckConfig`], [`Probe`]             |
//! | **Policies**      | Restart budget, fixed/exponential backoff, jitter.           | [`RestartPolicy`], [`BackoffPolicy`]         |
//! | **Events**        | Lifecycle, health, restart and output events.                | [`Event`], [`EventKind`], [`Subscribe`]      |
//! | **Errors**        | Typed errors for configuration, spawning, probes, control.   | [`ConfigError`], [`SupervisorError`]         |
//! | **Configuration** | Supervisor-wide timing and bus settings.                     | [`SupervisorConfig`]                         |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber that renders events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use procvisor::{HealthCheckConfig, ProcessConfig, Probe, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = SupervisorConfig::default();
//!     cfg.grace = Duration::from_secs(10);
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn procvisor::Subscribe>> = {
//!         let writer = Arc::new(procvisor::LogWriter::default());
//!         vec![writer]
//!     };
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn procvisor::Subscribe>> = Vec::new();
//!
//!     let sup = Supervisor::builder(cfg).with_subscribers(subs).build(vec![
//!         ProcessConfig::new("db", "postgres")
//!             .with_args(["-D", "./data"])
//!             .with_health_check(HealthCheckConfig::new(Probe::tcp("127.0.0.1", 5432))),
//!         ProcessConfig::new("api", "./target/debug/api")
//!             .with_depends_on(["db"])
//!             .with_auto_restart(true)
//!             .with_max_restarts(5)
//!             .with_backoff(2.0, Duration::from_secs(30)),
//!     ])?;
//!
//!     sup.start_all().await?;
//!     println!("api is {}", sup.get_state("api")?);
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod graph;
mod health;
mod policies;
mod process;
mod subscribers;

// ---- Public re-exports ----

pub use core::{Supervisor, SupervisorBuilder, SupervisorConfig};
pub use error::{ConfigError, ProbeError, SpawnError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use graph::DependencyGraph;
pub use health::{HealthStatus, ProbeContext, run_probe};
pub use policies::{
    BackoffPolicy, JitterPolicy, MAX_RESTARTS_EXCEEDED, RestartDecision, RestartPolicy,
};
pub use process::{
    ExitStatus, HealthCheckConfig, LogStream, ProcessConfig, ProcessHandle, ProcessInfo,
    ProcessState, Probe, RestartAttempt, SignalKind,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
