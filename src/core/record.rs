//! # Authoritative per-process record.
//!
//! A [`ProcessRecord`] is owned by exactly one process actor and never shared;
//! everyone else sees the [`ProcessInfo`] snapshots it produces.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::health::HealthStatus;
use crate::process::{ExitStatus, ProcessHandle, ProcessInfo, ProcessState, RestartAttempt};

/// Restart attempts kept in the history; older ones are dropped first.
pub(crate) const HISTORY_LIMIT: usize = 32;

#[derive(Debug)]
pub(crate) struct ProcessRecord {
    pub state: ProcessState,
    pub health: HealthStatus,
    /// Live OS handle; present from `Starting` until the exit is observed.
    pub handle: Option<ProcessHandle>,
    pub started_at: Option<SystemTime>,
    pub restart_count: u32,
    pub last_exit: Option<ExitStatus>,
    /// Most recent restart attempts, at most [`HISTORY_LIMIT`].
    pub history: VecDeque<RestartAttempt>,
}

impl ProcessRecord {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Stopped,
            health: HealthStatus::Unknown,
            handle: None,
            started_at: None,
            restart_count: 0,
            last_exit: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Bumps the restart counter and records the attempt; returns the attempt number.
    ///
    /// The counter keeps growing; only the history is bounded.
    pub fn record_restart(&mut self, delay: Duration, exit_code: Option<i32>) -> u32 {
        self.restart_count = self.restart_count.saturating_add(1);
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(RestartAttempt {
            at: SystemTime::now(),
            attempt: self.restart_count,
            delay,
            exit_code,
        });
        self.restart_count
    }

    /// Clears the restart counter and history; returns the previous count.
    pub fn reset_restarts(&mut self) -> u32 {
        self.history.clear();
        std::mem::take(&mut self.restart_count)
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(ProcessHandle::pid)
    }

    pub fn snapshot(
        &self,
        name: &Arc<str>,
        start_pending: bool,
        restart_scheduled: bool,
    ) -> ProcessInfo {
        ProcessInfo {
            name: name.clone(),
            state: self.state.clone(),
            health: self.health,
            pid: self.pid(),
            started_at: self.started_at,
            restart_count: self.restart_count,
            last_exit: self.last_exit,
            start_pending,
            restart_scheduled,
            restart_history: self.history.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restarts_are_numbered_and_reset_together() {
        let mut rec = ProcessRecord::new();
        assert_eq!(rec.record_restart(Duration::from_millis(500), Some(1)), 1);
        assert_eq!(rec.record_restart(Duration::from_millis(500), Some(1)), 2);
        assert_eq!(rec.history.len(), 2);
        assert_eq!(rec.history[1].attempt, 2);

        assert_eq!(rec.reset_restarts(), 2);
        assert_eq!(rec.restart_count, 0);
        assert!(rec.history.is_empty());
    }

    #[test]
    fn history_keeps_only_the_latest_attempts() {
        let mut rec = ProcessRecord::new();
        let total = HISTORY_LIMIT as u32 + 10;
        for _ in 0..total {
            rec.record_restart(Duration::from_millis(1), Some(1));
        }

        assert_eq!(rec.restart_count, total);
        assert_eq!(rec.history.len(), HISTORY_LIMIT);
        assert_eq!(rec.history.front().map(|a| a.attempt), Some(11));
        assert_eq!(rec.history.back().map(|a| a.attempt), Some(total));

        let info = rec.snapshot(&Arc::from("worker"), false, true);
        assert_eq!(info.restart_count, total);
        assert_eq!(info.restart_history.len(), HISTORY_LIMIT);
        assert_eq!(info.restart_history[0].attempt, 11);
    }

    #[test]
    fn snapshot_reflects_flags() {
        let rec = ProcessRecord::new();
        let info = rec.snapshot(&Arc::from("db"), true, false);
        assert_eq!(info.state, ProcessState::Stopped);
        assert!(info.start_pending);
        assert!(info.pid.is_none());
    }
}
