//! # Background health checker.
//!
//! One [`HealthChecker`] runs per live process run. It waits `initial_delay`,
//! then probes every `interval`, feeding outcomes into a [`HealthTracker`] and
//! publishing verdict changes through a `watch` channel read by the process owner.
//!
//! The checker never touches process state itself; it stops when its token is
//! cancelled or when the checker handle is dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::health::probe::{ProbeContext, run_probe};
use crate::health::{HealthStatus, HealthTracker};
use crate::process::HealthCheckConfig;

/// Latest verdict of a checker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Error of the probe that produced an `Unhealthy` verdict.
    pub error: Option<Arc<str>>,
}

/// Handle to a running checker task.
pub struct HealthChecker {
    rx: watch::Receiver<HealthReport>,
    token: CancellationToken,
}

impl HealthChecker {
    /// Spawns the probe loop. The loop is also stopped when `parent` is cancelled.
    pub fn spawn(
        process: Arc<str>,
        cfg: HealthCheckConfig,
        ctx: ProbeContext,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let (tx, rx) = watch::channel(HealthReport::default());
        tokio::spawn(probe_loop(process, cfg, ctx, tx, token.clone()));
        Self { rx, token }
    }

    /// Waits for the next verdict change.
    ///
    /// Never resolves once the checker is gone, so it can sit in a `select!`.
    pub async fn changed(&mut self) -> HealthReport {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        self.rx.borrow_and_update().clone()
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn probe_loop(
    process: Arc<str>,
    cfg: HealthCheckConfig,
    ctx: ProbeContext,
    tx: watch::Sender<HealthReport>,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = time::sleep(cfg.initial_delay) => {}
    }

    let mut tracker = HealthTracker::new(cfg.success_threshold, cfg.retries);
    let mut ticker = time::interval(cfg.interval.max(time::Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = token.cancelled() => break,
            res = run_probe(&cfg.probe, &ctx, cfg.timeout) => res,
        };

        if let Err(e) = &outcome {
            tracing::trace!(
                process = %process,
                error = %e,
                label = e.as_label(),
                "health probe failed"
            );
        }

        if let Some(status) = tracker.record(outcome.is_ok()) {
            let report = HealthReport {
                status,
                error: outcome.err().map(|e| Arc::from(e.to_string())),
            };
            if tx.send(report).is_err() {
                break;
            }
        }
    }
}
