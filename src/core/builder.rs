use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{SupervisorConfig, registry::Registry, supervisor::Supervisor};
use crate::error::ConfigError;
use crate::events::Bus;
use crate::graph::DependencyGraph;
use crate::process::ProcessConfig;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Supervisor`] with optional callback subscribers.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use procvisor::{ProcessConfig, Subscribe, Supervisor, SupervisorConfig};
/// # async fn demo(subs: Vec<Arc<dyn Subscribe>>) -> Result<(), procvisor::ConfigError> {
/// let sup = Supervisor::builder(SupervisorConfig::default())
///     .with_subscribers(subs)
///     .build(vec![ProcessConfig::new("web", "npm").with_args(["run", "dev"])])?;
/// # Ok(()) }
/// ```
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets callback subscribers.
    ///
    /// Each receives every event through its own bounded queue and worker.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one callback subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Validates `processes` and spawns the runtime.
    ///
    /// On error nothing is spawned. Must be called inside a tokio runtime.
    pub fn build(self, processes: Vec<ProcessConfig>) -> Result<Arc<Supervisor>, ConfigError> {
        for process in &processes {
            process.validate()?;
        }
        let graph = DependencyGraph::new(&processes)?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shutdown_token = CancellationToken::new();
        let runtime_token = CancellationToken::new();

        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            Some(subscriber_listener(&bus, set, runtime_token.clone()))
        };

        let registry = Registry::spawn(
            processes,
            &graph,
            &self.cfg,
            &bus,
            &shutdown_token,
            &runtime_token,
        );
        tracing::debug!(processes = graph.len(), order = ?graph.start_order(), "supervisor loaded");

        Ok(Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            graph,
            registry,
            shutdown_token,
            runtime_token,
            listener,
        )))
    }
}

/// Forwards bus events to the subscriber set until the runtime token is cancelled,
/// then drains what is left and waits for the subscriber workers.
fn subscriber_listener(
    bus: &Bus,
    set: SubscriberSet,
    runtime: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = runtime.cancelled() => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(&ev);
        }
        set.shutdown().await;
    })
}
