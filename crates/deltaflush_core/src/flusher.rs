//! Commit flushing.

use crate::backend::DeltaBackend;
use crate::cancel::CancelToken;
use crate::error::FlushResult;
use crate::state::DeltaState;
use crate::stats::FlusherStats;
use crate::types::Delta;
use crate::waiter::SyncWaiter;
use tracing::{trace, warn};

/// Flushes the pending staged delta.
///
/// The flush-pending flag is claimed with a test-and-clear, so each time it
/// is set exactly one caller runs the flush.
pub struct CommitFlusher<'a, B: ?Sized> {
    state: &'a DeltaState,
    backend: &'a B,
    stats: &'a FlusherStats,
}

impl<'a, B: DeltaBackend + ?Sized> CommitFlusher<'a, B> {
    /// Creates a flusher over one volume's state and backend.
    pub fn new(state: &'a DeltaState, backend: &'a B, stats: &'a FlusherStats) -> Self {
        Self {
            state,
            backend,
            stats,
        }
    }

    /// Flushes the pending delta if there is one.
    ///
    /// Returns `true` if this call ran a flush. On failure the committed
    /// delta is untouched and the pending flag is set again, so the staged
    /// delta is retried by the next caller.
    pub fn drain_pending(&self) -> FlushResult<bool> {
        let Some(claim) = self.state.claim_flush() else {
            return Ok(false);
        };

        self.stats.record_flush();
        if let Err(err) = self.backend.flush_delta(&claim) {
            self.stats.record_flush_failure();
            warn!(
                staging = self.state.staging().as_u32(),
                committed = self.state.committed().as_u32(),
                error = %err,
                "delta flush failed"
            );
            claim.rearm();
            return Err(err.into());
        }
        Ok(true)
    }

    /// Makes progress toward `committed ≥ target`.
    ///
    /// At most one flush runs per call, which may not be enough to reach
    /// `target`; the caller waits and calls again.
    pub fn attempt_flush_until(&self, target: Delta) -> FlushResult<bool> {
        trace!(
            delta = target.as_u32(),
            committed = self.state.committed().as_u32(),
            backend_state = self.state.backend_state(),
            "try flush pending until"
        );

        if !self.is_committed(target) {
            self.drain_pending()?;
        }
        Ok(self.is_committed(target))
    }

    /// Blocks until `committed ≥ target`, flushing pending deltas on the way.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if `cancel` fires first, or the flush error if a
    /// flush this caller ran failed.
    pub fn wait_until_committed(&self, target: Delta, cancel: &CancelToken) -> FlushResult<()> {
        SyncWaiter::new(self.state)
            .wait_until(cancel, || self.attempt_flush_until(target))
            .inspect_err(|err| {
                if err.is_interrupted() {
                    self.stats.record_interrupted();
                }
            })
    }

    fn is_committed(&self, target: Delta) -> bool {
        self.state.committed().is_after_eq(target)
    }
}
