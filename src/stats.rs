//! Self-monitoring counters for the agent
//!
//! Counters only describe what happened; no cycle reads them to make
//! decisions, so cycles stay independent of each other.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`CycleStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub fired: u64,
    pub completed: u64,
    pub failed: u64,
    pub alerts_sent: u64,
    pub alert_failures: u64,
}

/// Lock-free counters shared by the scheduler and every cycle
#[derive(Debug, Default)]
pub struct CycleStats {
    fired: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    alerts_sent: AtomicU64,
    alert_failures: AtomicU64,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fired(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the result of an alert dispatch attempt
    pub fn record_alert(&self, success: bool) {
        if success {
            self.alerts_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alert_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fired: self.fired.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alert_failures: self.alert_failures.load(Ordering::Relaxed),
        }
    }

    /// Log a one-line summary, used at shutdown
    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            "Cycle summary: fired={}, completed={}, failed={}, alerts_sent={}, alert_failures={}",
            s.fired, s.completed, s.failed, s.alerts_sent, s.alert_failures
        );
    }
}
