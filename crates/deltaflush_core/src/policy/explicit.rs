//! Self-driven flush policy.

use crate::backend::current_delta;
use crate::cancel::CancelToken;
use crate::config::FlushPolicyKind;
use crate::error::{FlushError, FlushResult};
use crate::policy::{FlushContext, FlushPolicy};
use crate::types::{DrainOutcome, UnifyMode, WritebackBudget};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// Callers drive their own durability.
///
/// `sync` pins the current delta, stages it, and flushes it before returning.
/// Concurrent full syncs go through one at a time; writers and other
/// transition or flush callers are not blocked by this.
#[derive(Debug)]
pub struct ExplicitSyncEngine {
    ctx: FlushContext,
    /// Serializes full syncs against each other.
    sync_lock: Mutex<()>,
}

impl ExplicitSyncEngine {
    /// Creates the policy over a volume's context.
    pub fn new(ctx: FlushContext) -> Self {
        Self {
            ctx,
            sync_lock: Mutex::new(()),
        }
    }

    /// Enters the full-sync section, giving up at the token's deadline.
    fn enter_sync(&self, cancel: &CancelToken) -> FlushResult<MutexGuard<'_, ()>> {
        match cancel.deadline() {
            Some(deadline) => self
                .sync_lock
                .try_lock_until(deadline)
                .ok_or(FlushError::Interrupted),
            None => Ok(self.sync_lock.lock()),
        }
    }
}

impl FlushPolicy for ExplicitSyncEngine {
    fn kind(&self) -> FlushPolicyKind {
        FlushPolicyKind::Explicit
    }

    fn sync(&self, unify: UnifyMode, cancel: &CancelToken) -> FlushResult<()> {
        let _exclusive = self.enter_sync(cancel)?;
        let state = self.ctx.state();

        // The delta that has to be written.
        let delta = current_delta(self.ctx.backend(), state);
        debug!(delta = delta.as_u32(), %unify, "sync current delta");

        self.ctx
            .transitions()
            .wait_until_transitioned(delta, unify, cancel)?;
        debug_assert!(state.staging().is_after_eq(delta));

        self.ctx.flusher().wait_until_committed(delta, cancel)?;
        debug_assert!(state.committed().is_after_eq(delta));

        self.ctx.stats().record_sync();
        debug!(
            delta = delta.as_u32(),
            committed = state.committed().as_u32(),
            "sync done"
        );
        Ok(())
    }

    fn drain(&self, _budget: WritebackBudget, _cancel: &CancelToken) -> FlushResult<DrainOutcome> {
        // Host writeback is off for this policy; nothing is drained here.
        trace!("periodic drain ignored by explicit policy");
        self.ctx.stats().record_drain(false);
        Ok(DrainOutcome::idle())
    }

    fn try_transition(&self, unify: UnifyMode) -> FlushResult<()> {
        self.ctx.transitions().attempt_transition(unify)?;
        Ok(())
    }

    fn schedule_flush(&self) {
        self.ctx.state().broadcast();
    }

    fn host_writeback_enabled(&self) -> bool {
        false
    }
}
