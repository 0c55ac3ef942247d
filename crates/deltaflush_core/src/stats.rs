//! Flusher statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//! They only ever increase.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-volume flusher counters.
#[derive(Debug, Default)]
pub struct FlusherStats {
    /// Transitions this volume executed.
    transitions_run: AtomicU64,
    /// Transition attempts that found another caller already running one.
    transitions_skipped: AtomicU64,
    /// Transitions that returned an error.
    transition_failures: AtomicU64,
    /// Flushes executed.
    flushes_run: AtomicU64,
    /// Flushes that returned an error.
    flush_failures: AtomicU64,
    /// Full syncs that returned success.
    syncs_completed: AtomicU64,
    /// Blocking waits that were interrupted.
    waits_interrupted: AtomicU64,
    /// Periodic drains that did work.
    drains_run: AtomicU64,
    /// Periodic drains that returned without touching state.
    drains_idle: AtomicU64,
}

impl FlusherStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transition(&self) {
        self.transitions_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transition_skipped(&self) {
        self.transitions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transition_failure(&self) {
        self.transition_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self) {
        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_interrupted(&self) {
        self.waits_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self, progressed: bool) {
        if progressed {
            self.drains_run.fetch_add(1, Ordering::Relaxed);
        } else {
            self.drains_idle.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transitions_run: self.transitions_run.load(Ordering::Relaxed),
            transitions_skipped: self.transitions_skipped.load(Ordering::Relaxed),
            transition_failures: self.transition_failures.load(Ordering::Relaxed),
            flushes_run: self.flushes_run.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            syncs_completed: self.syncs_completed.load(Ordering::Relaxed),
            waits_interrupted: self.waits_interrupted.load(Ordering::Relaxed),
            drains_run: self.drains_run.load(Ordering::Relaxed),
            drains_idle: self.drains_idle.load(Ordering::Relaxed),
        }
    }
}

/// Immutable copy of [`FlusherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Transitions executed.
    pub transitions_run: u64,
    /// Transition attempts that were no-ops.
    pub transitions_skipped: u64,
    /// Transitions that failed.
    pub transition_failures: u64,
    /// Flushes executed.
    pub flushes_run: u64,
    /// Flushes that failed.
    pub flush_failures: u64,
    /// Successful full syncs.
    pub syncs_completed: u64,
    /// Interrupted waits.
    pub waits_interrupted: u64,
    /// Drains that did work.
    pub drains_run: u64,
    /// Drains that did nothing.
    pub drains_idle: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(FlusherStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_methods_increment() {
        let stats = FlusherStats::new();
        stats.record_transition();
        stats.record_transition_skipped();
        stats.record_flush();
        stats.record_flush();
        stats.record_drain(true);
        stats.record_drain(false);
        stats.record_interrupted();

        let snap = stats.snapshot();
        assert_eq!(snap.transitions_run, 1);
        assert_eq!(snap.transitions_skipped, 1);
        assert_eq!(snap.flushes_run, 2);
        assert_eq!(snap.drains_run, 1);
        assert_eq!(snap.drains_idle, 1);
        assert_eq!(snap.waits_interrupted, 1);
    }
}
