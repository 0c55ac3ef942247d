//! Host-driven flush policy.

use crate::backend::{current_delta, HostSync};
use crate::cancel::CancelToken;
use crate::config::FlushPolicyKind;
use crate::error::{FlushError, FlushResult};
use crate::policy::{FlushContext, FlushPolicy};
use crate::types::{DrainOutcome, UnifyMode, WritebackBudget};
use crate::waiter::SyncWaiter;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The host's writeback scheduler drives flushing.
///
/// Each periodic [`drain`](FlushPolicy::drain) stages the current delta and
/// flushes whatever delta becomes ready. A full sync runs the host's per-file
/// sweep, whose writeback calls end up in `drain`.
pub struct HostDrivenEngine {
    ctx: FlushContext,
    host: Arc<dyn HostSync>,
}

impl HostDrivenEngine {
    /// Creates the policy over a volume's context and its host.
    pub fn new(ctx: FlushContext, host: Arc<dyn HostSync>) -> Self {
        Self { ctx, host }
    }
}

impl FlushPolicy for HostDrivenEngine {
    fn kind(&self) -> FlushPolicyKind {
        FlushPolicyKind::HostDriven
    }

    fn sync(&self, unify: UnifyMode, cancel: &CancelToken) -> FlushResult<()> {
        if unify == UnifyMode::Force {
            warn!("force unify is not supported by host-driven flushing, syncing anyway");
        }
        debug!("sync via host sweep");
        if let Err(err) = self.host.sync_all(cancel) {
            // A sweep cut short by the caller's token is an interruption.
            if cancel.is_cancelled() {
                self.ctx.stats().record_interrupted();
                return Err(FlushError::Interrupted);
            }
            return Err(err.into());
        }
        self.ctx.stats().record_sync();
        Ok(())
    }

    fn drain(&self, budget: WritebackBudget, cancel: &CancelToken) -> FlushResult<DrainOutcome> {
        // Replay has not finished yet; don't flush.
        if !self.host.is_active() {
            trace!("volume not active, skipping drain");
            self.ctx.stats().record_drain(false);
            return Ok(DrainOutcome::idle());
        }

        let state = self.ctx.state();
        let delta = current_delta(self.ctx.backend(), state);
        debug!(delta = delta.as_u32(), nr_pages = budget.nr_pages, "periodic drain");

        // Only ALLOW is supported on this path.
        self.ctx
            .transitions()
            .wait_until_transitioned(delta, UnifyMode::Allow, cancel)?;
        debug_assert!(state.staging().is_after_eq(delta));

        // Wait for the last referencer of a staged delta to go. This is any
        // pending delta, not necessarily `delta`.
        SyncWaiter::new(state)
            .wait_until(cancel, || Ok(state.is_flush_pending()))
            .inspect_err(|err| {
                if err.is_interrupted() {
                    self.ctx.stats().record_interrupted();
                }
            })?;

        self.ctx.flusher().drain_pending()?;

        self.ctx.stats().record_drain(true);
        Ok(DrainOutcome::progressed())
    }

    fn try_transition(&self, _unify: UnifyMode) -> FlushResult<()> {
        // Transitions happen from the host's writeback.
        Ok(())
    }

    fn schedule_flush(&self) {
        self.ctx.state().broadcast();
    }

    fn host_writeback_enabled(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for HostDrivenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDrivenEngine")
            .field("ctx", &self.ctx)
            .field("active", &self.host.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeltaBackend;
    use crate::state::DeltaState;
    use crate::stats::FlusherStats;
    use crate::test_support::{MockBackend, MockHost};
    use crate::types::Delta;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn engine(host: MockHost) -> (HostDrivenEngine, Arc<MockBackend>, Arc<MockHost>) {
        let backend = Arc::new(MockBackend::new(6));
        let host = Arc::new(host);
        let ctx = FlushContext::new(
            Arc::new(DeltaState::new(Delta::new(5))),
            Arc::clone(&backend) as Arc<dyn DeltaBackend>,
            Arc::new(FlusherStats::new()),
        );
        let engine = HostDrivenEngine::new(ctx, Arc::clone(&host) as Arc<dyn HostSync>);
        (engine, backend, host)
    }

    #[test]
    fn inactive_volume_drain_is_noop() {
        let (engine, backend, _host) = engine(MockHost::default());
        let before = engine.ctx.state().snapshot();
        let generation = engine.ctx.state().event().generation();

        let outcome = engine
            .drain(WritebackBudget::new(1024), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome, DrainOutcome::idle());
        assert_eq!(engine.ctx.state().snapshot(), before);
        assert_eq!(engine.ctx.state().event().generation(), generation);
        assert_eq!(backend.transitions(), 0);
    }

    #[test]
    fn drain_stages_and_flushes() {
        let (engine, backend, _host) = engine(MockHost::active());
        let outcome = engine
            .drain(WritebackBudget::new(1024), &CancelToken::new())
            .unwrap();
        assert!(outcome.progressed);
        assert_eq!(outcome.pages_consumed, 0);
        assert_eq!(backend.transitions(), 1);
        assert_eq!(backend.flushes(), 1);
        assert_eq!(engine.ctx.state().committed(), Delta::new(6));
        assert_eq!(backend.unify_seen.lock().as_slice(), &[UnifyMode::Allow]);
    }

    #[test]
    fn drain_flush_failure_surfaces() {
        let (engine, backend, _host) = engine(MockHost::active());
        backend.fail_flush.store(true, Ordering::SeqCst);
        let err = engine
            .drain(WritebackBudget::new(1), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, FlushError::Backend(_)));
        assert_eq!(engine.ctx.state().committed(), Delta::new(5));
        assert!(engine.ctx.state().is_flush_pending());
    }

    #[test]
    fn drain_wait_for_pending_is_cancellable() {
        let (engine, backend, _host) = engine(MockHost::active());
        // Staging is already past the current delta and nothing is pending,
        // so the drain can only wait.
        backend.current.store(5, Ordering::SeqCst);
        let token = CancelToken::with_timeout(Duration::from_millis(20));
        let err = engine.drain(WritebackBudget::new(1), &token).unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(backend.flushes(), 0);
    }

    #[test]
    fn sync_delegates_to_host() {
        let (engine, backend, host) = engine(MockHost::active());
        engine.sync(UnifyMode::Force, &CancelToken::new()).unwrap();
        assert_eq!(host.sweeps.load(Ordering::SeqCst), 1);
        assert_eq!(backend.transitions(), 0);
    }

    #[test]
    fn sync_sweep_failure_propagates() {
        let (engine, _backend, host) = engine(MockHost::active());
        host.fail_sweep.store(true, Ordering::SeqCst);
        assert!(engine.sync(UnifyMode::Allow, &CancelToken::new()).is_err());
    }

    #[test]
    fn sweep_failure_after_cancel_is_interrupted() {
        let (engine, _backend, host) = engine(MockHost::active());
        host.fail_sweep.store(true, Ordering::SeqCst);
        let token = CancelToken::new();
        token.cancel();
        let err = engine.sync(UnifyMode::Allow, &token).unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(engine.ctx.stats().snapshot().waits_interrupted, 1);
        assert_eq!(engine.ctx.stats().snapshot().syncs_completed, 0);
    }

    #[test]
    fn try_transition_is_noop() {
        let (engine, backend, _host) = engine(MockHost::active());
        engine.try_transition(UnifyMode::Allow).unwrap();
        assert_eq!(backend.transitions(), 0);
        assert!(engine.host_writeback_enabled());
    }
}
