//! Shared per-volume delta state.

use crate::event::DeltaEvent;
use crate::types::Delta;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A transition is executing.
const TRANSITION_RUNNING: u32 = 1 << 0;
/// A staged delta is ready to be flushed.
const FLUSH_PENDING: u32 = 1 << 1;

/// Counters, flags and broadcast channel shared by every caller of one
/// mounted volume.
///
/// ## Invariants
///
/// - `committed ≤ staging ≤ current`, compared circularly
/// - `staging` only moves while a [`TransitionRun`] is held
/// - `committed` only moves while a [`FlushClaim`] is held
/// - every change to a counter or flag is followed by a broadcast
///
/// No lock protects the counters. Exclusion comes from the atomic
/// read-modify-write on the flag word; visibility comes from release stores
/// paired with acquire loads, and from the broadcast lock.
pub struct DeltaState {
    /// Highest delta whose transition has begun.
    staging: AtomicU32,
    /// Highest delta written to stable storage.
    committed: AtomicU32,
    /// `TRANSITION_RUNNING | FLUSH_PENDING`.
    backend_state: AtomicU32,
    event: Arc<DeltaEvent>,
}

impl DeltaState {
    /// Creates state with both counters at `initial`.
    #[must_use]
    pub fn new(initial: Delta) -> Self {
        Self {
            staging: AtomicU32::new(initial.as_u32()),
            committed: AtomicU32::new(initial.as_u32()),
            backend_state: AtomicU32::new(0),
            event: Arc::new(DeltaEvent::new()),
        }
    }

    /// Returns the staging delta.
    #[must_use]
    pub fn staging(&self) -> Delta {
        Delta::new(self.staging.load(Ordering::Acquire))
    }

    /// Returns the committed delta.
    #[must_use]
    pub fn committed(&self) -> Delta {
        Delta::new(self.committed.load(Ordering::Acquire))
    }

    /// Returns the raw flag word, for tracing.
    #[must_use]
    pub fn backend_state(&self) -> u32 {
        self.backend_state.load(Ordering::Acquire)
    }

    /// Returns true while a transition is executing.
    #[must_use]
    pub fn is_transition_running(&self) -> bool {
        self.backend_state() & TRANSITION_RUNNING != 0
    }

    /// Returns true while a staged delta waits to be flushed.
    #[must_use]
    pub fn is_flush_pending(&self) -> bool {
        self.backend_state() & FLUSH_PENDING != 0
    }

    /// Returns the broadcast channel.
    #[must_use]
    pub fn event(&self) -> &Arc<DeltaEvent> {
        &self.event
    }

    /// Wakes every waiter so it re-checks its condition.
    pub fn broadcast(&self) {
        self.event.broadcast();
    }

    /// Captures counters and flags at one point in time.
    #[must_use]
    pub fn snapshot(&self) -> DeltaSnapshot {
        let flags = self.backend_state();
        DeltaSnapshot {
            staging: self.staging(),
            committed: self.committed(),
            transition_running: flags & TRANSITION_RUNNING != 0,
            flush_pending: flags & FLUSH_PENDING != 0,
        }
    }

    /// Test-and-sets the transition flag.
    ///
    /// Returns `None` if another caller holds it. The returned run clears the
    /// flag when finished or dropped.
    pub fn try_begin_transition(&self) -> Option<TransitionRun<'_>> {
        let prev = self.backend_state.fetch_or(TRANSITION_RUNNING, Ordering::AcqRel);
        if prev & TRANSITION_RUNNING != 0 {
            return None;
        }
        self.broadcast();
        Some(TransitionRun { state: self })
    }

    /// Marks a staged delta as ready to flush and wakes waiters.
    ///
    /// Called by the backend once the staged delta has no writers left.
    pub fn mark_flush_pending(&self) {
        self.backend_state.fetch_or(FLUSH_PENDING, Ordering::AcqRel);
        self.broadcast();
    }

    /// Test-and-clears the flush flag.
    ///
    /// Returns `None` if nothing is pending. Only one caller can win a given
    /// setting of the flag.
    pub fn claim_flush(&self) -> Option<FlushClaim<'_>> {
        let prev = self.backend_state.fetch_and(!FLUSH_PENDING, Ordering::AcqRel);
        if prev & FLUSH_PENDING == 0 {
            return None;
        }
        self.broadcast();
        Some(FlushClaim { state: self })
    }
}

impl std::fmt::Debug for DeltaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaState")
            .field("staging", &self.staging())
            .field("committed", &self.committed())
            .field("backend_state", &format_args!("{:#x}", self.backend_state()))
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a [`DeltaState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeltaSnapshot {
    /// Staging delta.
    pub staging: Delta,
    /// Committed delta.
    pub committed: Delta,
    /// Transition flag.
    pub transition_running: bool,
    /// Flush flag.
    pub flush_pending: bool,
}

/// Exclusive right to run a delta transition.
///
/// Handed to [`DeltaBackend::delta_transition`](crate::DeltaBackend::delta_transition),
/// which owns it from then on. Finishing or dropping the run clears the
/// transition flag and broadcasts, so a failed transition never leaves the
/// flag stuck.
#[must_use = "dropping a TransitionRun ends the transition"]
pub struct TransitionRun<'a> {
    state: &'a DeltaState,
}

impl<'a> TransitionRun<'a> {
    /// Returns the state this run belongs to.
    #[must_use]
    pub fn state(&self) -> &'a DeltaState {
        self.state
    }

    /// Moves the staging delta forward to `delta` and broadcasts.
    pub fn advance_staging(&self, delta: Delta) {
        debug_assert!(
            delta.is_after_eq(self.state.staging()),
            "staging must not move backwards"
        );
        self.state.staging.store(delta.as_u32(), Ordering::Release);
        self.state.broadcast();
    }

    /// Marks the staged delta as ready to flush.
    pub fn mark_flush_pending(&self) {
        self.state.mark_flush_pending();
    }

    /// Ends the transition.
    pub fn finish(self) {}
}

impl Drop for TransitionRun<'_> {
    fn drop(&mut self) {
        self.state.backend_state.fetch_and(!TRANSITION_RUNNING, Ordering::AcqRel);
        self.state.broadcast();
    }
}

/// Exclusive right to flush the pending delta.
///
/// Only a claim can advance the committed delta.
pub struct FlushClaim<'a> {
    state: &'a DeltaState,
}

impl<'a> FlushClaim<'a> {
    /// Returns the state this claim belongs to.
    #[must_use]
    pub fn state(&self) -> &'a DeltaState {
        self.state
    }

    /// Moves the committed delta forward to `delta` and broadcasts.
    pub fn advance_committed(&self, delta: Delta) {
        debug_assert!(
            delta.is_after_eq(self.state.committed()),
            "committed must not move backwards"
        );
        debug_assert!(
            self.state.staging().is_after_eq(delta),
            "committed must not pass staging"
        );
        self.state.committed.store(delta.as_u32(), Ordering::Release);
        self.state.broadcast();
    }

    /// Gives the pending signal back after a failed flush.
    pub(crate) fn rearm(self) {
        self.state.mark_flush_pending();
    }
}
