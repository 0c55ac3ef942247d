//! Flush policies.
//!
//! A volume runs exactly one policy, picked from [`FlushPolicyKind`] at
//! mount:
//!
//! - [`ExplicitSyncEngine`]: callers drive transition and flush themselves.
//!   Full syncs are serialized against each other and wait for the precise
//!   delta they pinned. The host's periodic writeback is disabled.
//! - [`HostDrivenEngine`]: the host's writeback scheduler calls
//!   [`FlushPolicy::drain`] periodically; a full sync is handed to the
//!   host's per-file sweep, which reaches the drain through its own
//!   writeback calls.
//!
//! Both policies share the same [`TransitionCoordinator`] and
//! [`CommitFlusher`] over the volume's [`DeltaState`].

mod explicit;
mod host;

pub use explicit::ExplicitSyncEngine;
pub use host::HostDrivenEngine;

use crate::backend::DeltaBackend;
use crate::cancel::CancelToken;
use crate::config::FlushPolicyKind;
use crate::error::FlushResult;
use crate::flusher::CommitFlusher;
use crate::state::DeltaState;
use crate::stats::FlusherStats;
use crate::transition::TransitionCoordinator;
use crate::types::{DrainOutcome, UnifyMode, WritebackBudget};
use std::sync::Arc;

/// Scheduling policy for one volume.
pub trait FlushPolicy: Send + Sync {
    /// Returns which policy this is.
    fn kind(&self) -> FlushPolicyKind;

    /// Makes the current delta durable before returning.
    fn sync(&self, unify: UnifyMode, cancel: &CancelToken) -> FlushResult<()>;

    /// Periodic writeback entry point.
    fn drain(&self, budget: WritebackBudget, cancel: &CancelToken) -> FlushResult<DrainOutcome>;

    /// Starts a transition if none is running, without waiting for it.
    fn try_transition(&self, unify: UnifyMode) -> FlushResult<()>;

    /// Wakes every waiter so pending staging is looked at again.
    fn schedule_flush(&self);

    /// Returns whether the host's writeback scheduler should call
    /// [`drain`](Self::drain) for this volume.
    fn host_writeback_enabled(&self) -> bool;
}

/// What every policy works on: the volume's state, backend and counters.
#[derive(Clone)]
pub struct FlushContext {
    state: Arc<DeltaState>,
    backend: Arc<dyn DeltaBackend>,
    stats: Arc<FlusherStats>,
}

impl FlushContext {
    /// Bundles a volume's shared pieces.
    pub fn new(
        state: Arc<DeltaState>,
        backend: Arc<dyn DeltaBackend>,
        stats: Arc<FlusherStats>,
    ) -> Self {
        Self {
            state,
            backend,
            stats,
        }
    }

    /// Returns the delta state.
    #[must_use]
    pub fn state(&self) -> &DeltaState {
        &self.state
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &dyn DeltaBackend {
        &*self.backend
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &FlusherStats {
        &self.stats
    }

    /// Returns a transition coordinator over this context.
    #[must_use]
    pub fn transitions(&self) -> TransitionCoordinator<'_, dyn DeltaBackend> {
        TransitionCoordinator::new(&self.state, &*self.backend, &self.stats)
    }

    /// Returns a commit flusher over this context.
    #[must_use]
    pub fn flusher(&self) -> CommitFlusher<'_, dyn DeltaBackend> {
        CommitFlusher::new(&self.state, &*self.backend, &self.stats)
    }
}

impl std::fmt::Debug for FlushContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushContext")
            .field("state", &self.state)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}
