//! Cancellable wait on delta state.

use crate::cancel::CancelToken;
use crate::error::FlushResult;
use crate::event::DeltaEvent;
use crate::state::DeltaState;
use std::sync::Arc;

/// Blocks a caller until a condition over the delta state holds.
///
/// The condition is re-evaluated after every broadcast. It may also drive
/// progress itself (run a transition, claim a flush), so it must be safe to
/// evaluate any number of times.
#[derive(Debug, Clone, Copy)]
pub struct SyncWaiter<'a> {
    event: &'a Arc<DeltaEvent>,
}

impl<'a> SyncWaiter<'a> {
    /// Creates a waiter on `state`'s broadcast channel.
    #[must_use]
    pub fn new(state: &'a DeltaState) -> Self {
        Self {
            event: state.event(),
        }
    }

    /// Evaluates `condition` until it returns `true`.
    ///
    /// Between evaluations the caller sleeps until the next broadcast. An
    /// already-satisfied condition returns `Ok` even if `cancel` has fired.
    ///
    /// # Errors
    ///
    /// - [`FlushError::Interrupted`](crate::FlushError::Interrupted) if
    ///   `cancel` fires while the condition is false
    /// - any error returned by `condition`
    pub fn wait_until<F>(&self, cancel: &CancelToken, mut condition: F) -> FlushResult<()>
    where
        F: FnMut() -> FlushResult<bool>,
    {
        loop {
            // Read the generation first so a change made while the condition
            // runs wakes us immediately.
            let seen = self.event.generation();
            if condition()? {
                return Ok(());
            }
            self.event.wait_past(seen, cancel)?;
        }
    }
}
