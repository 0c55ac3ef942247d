//! Delta transition election.

use crate::backend::DeltaBackend;
use crate::cancel::CancelToken;
use crate::error::FlushResult;
use crate::state::{DeltaState, TransitionRun};
use crate::stats::FlusherStats;
use crate::types::{Delta, UnifyMode};
use crate::waiter::SyncWaiter;
use tracing::{trace, warn};

/// Elects a single caller to run the delta transition.
///
/// Whoever wins the transition flag runs the backend's transition on its own
/// thread; everyone else either returns or waits for the broadcast that the
/// winner's progress produces.
pub struct TransitionCoordinator<'a, B: ?Sized> {
    state: &'a DeltaState,
    backend: &'a B,
    stats: &'a FlusherStats,
}

impl<'a, B: DeltaBackend + ?Sized> TransitionCoordinator<'a, B> {
    /// Creates a coordinator over one volume's state and backend.
    pub fn new(state: &'a DeltaState, backend: &'a B, stats: &'a FlusherStats) -> Self {
        Self {
            state,
            backend,
            stats,
        }
    }

    /// Runs a transition unless one is already running.
    ///
    /// Returns `true` if this call ran it. Finding another transition in
    /// progress is not an error.
    pub fn attempt_transition(&self, unify: UnifyMode) -> FlushResult<bool> {
        trace!(
            staging = self.state.staging().as_u32(),
            backend_state = self.state.backend_state(),
            "try delta transition"
        );
        match self.state.try_begin_transition() {
            Some(run) => {
                self.run(run, unify)?;
                Ok(true)
            }
            None => {
                self.stats.record_transition_skipped();
                Ok(false)
            }
        }
    }

    /// Makes progress toward `staging ≥ target`.
    ///
    /// Returns whether the condition holds on return. `false` means another
    /// caller owns the transition and the caller should wait for a broadcast.
    pub fn attempt_transition_until(&self, target: Delta, unify: UnifyMode) -> FlushResult<bool> {
        trace!(
            delta = target.as_u32(),
            staging = self.state.staging().as_u32(),
            backend_state = self.state.backend_state(),
            "try delta transition until"
        );

        // Transition for target already started.
        if self.is_staged(target) {
            return Ok(true);
        }

        if let Some(run) = self.state.try_begin_transition() {
            // Someone may have staged it between our check and the flag.
            if self.is_staged(target) {
                run.finish();
                return Ok(true);
            }
            self.run(run, unify)?;
        }

        Ok(self.is_staged(target))
    }

    /// Blocks until `staging ≥ target`, driving transitions when possible.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if `cancel` fires first, or the transition's
    /// error if one this caller ran failed.
    pub fn wait_until_transitioned(
        &self,
        target: Delta,
        unify: UnifyMode,
        cancel: &CancelToken,
    ) -> FlushResult<()> {
        SyncWaiter::new(self.state)
            .wait_until(cancel, || self.attempt_transition_until(target, unify))
            .inspect_err(|err| {
                if err.is_interrupted() {
                    self.stats.record_interrupted();
                }
            })
    }

    fn is_staged(&self, target: Delta) -> bool {
        self.state.staging().is_after_eq(target)
    }

    fn run(&self, run: TransitionRun<'_>, unify: UnifyMode) -> FlushResult<()> {
        self.stats.record_transition();
        if let Err(err) = self.backend.delta_transition(run, unify) {
            self.stats.record_transition_failure();
            warn!(staging = self.state.staging().as_u32(), error = %err, "delta transition failed");
            return Err(err.into());
        }
        Ok(())
    }
}
