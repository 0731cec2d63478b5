use std::fmt;

/// Readiness of a running process as seen by its health checker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    /// No verdict yet (not running, or still inside the initial delay).
    #[default]
    Unknown,
    /// Enough consecutive probes succeeded.
    Healthy,
    /// Enough consecutive probes failed.
    Unhealthy,
}

impl HealthStatus {
    /// Short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Turns a stream of probe outcomes into a [`HealthStatus`].
///
/// - `success_threshold` consecutive successes → `Healthy`
/// - `retries` consecutive failures → `Unhealthy`
///
/// Between thresholds the previous verdict is kept, so a single failed probe
/// never flips a healthy process.
#[derive(Clone, Debug)]
pub struct HealthTracker {
    success_threshold: u32,
    failure_threshold: u32,
    successes: u32,
    failures: u32,
    status: HealthStatus,
}

impl HealthTracker {
    /// Thresholds below 1 are raised to 1.
    pub fn new(success_threshold: u32, retries: u32) -> Self {
        Self {
            success_threshold: success_threshold.max(1),
            failure_threshold: retries.max(1),
            successes: 0,
            failures: 0,
            status: HealthStatus::Unknown,
        }
    }

    /// Records one probe outcome and returns the new status if it changed.
    pub fn record(&mut self, ok: bool) -> Option<HealthStatus> {
        let next = if ok {
            self.failures = 0;
            self.successes = self.successes.saturating_add(1);
            if self.successes >= self.success_threshold {
                HealthStatus::Healthy
            } else {
                self.status
            }
        } else {
            self.successes = 0;
            self.failures = self.failures.saturating_add(1);
            if self.failures >= self.failure_threshold {
                HealthStatus::Unhealthy
            } else {
                self.status
            }
        };

        if next != self.status {
            self.status = next;
            Some(next)
        } else {
            None
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }
}
