//! External collaborators of the flusher.
//!
//! The coordinator decides *when* a transition or flush runs and *who* runs
//! it. What those operations do is up to the implementors of these traits.

use crate::cancel::CancelToken;
use crate::error::BackendError;
use crate::state::{DeltaState, FlushClaim, TransitionRun};
use crate::types::{Delta, UnifyMode};

/// A pin on the delta that is currently accumulating writes.
///
/// While any reference to a delta is held, the backend must not consider the
/// delta ready to flush.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a DeltaRef must be handed back with release_delta"]
pub struct DeltaRef {
    delta: Delta,
}

impl DeltaRef {
    /// Creates a reference to `delta`.
    pub const fn new(delta: Delta) -> Self {
        Self { delta }
    }

    /// Returns the pinned delta.
    #[must_use]
    pub const fn delta(&self) -> Delta {
        self.delta
    }
}

/// Writer-side delta tracking plus the staging and write-out work.
///
/// # Contract
///
/// - `delta_transition` receives the run guard and owns it; it advances
///   `staging` through the guard, sets flush-pending once the staged delta is
///   ready (possibly later, from `release_delta`), and ends the run. Dropping
///   the run on an error path is enough to clear the transition flag.
/// - `flush_delta` advances `committed` through the claim on success and
///   leaves it untouched on failure.
/// - `release_delta` must broadcast (or set flush-pending, which broadcasts)
///   when it drops the last reference to a superseded delta.
pub trait DeltaBackend: Send + Sync {
    /// Pins the current delta.
    fn acquire_delta(&self) -> DeltaRef;

    /// Releases a pin taken with [`acquire_delta`](Self::acquire_delta).
    fn release_delta(&self, state: &DeltaState, delta_ref: DeltaRef);

    /// Seals the current delta and stages it for write-out.
    fn delta_transition(
        &self,
        run: TransitionRun<'_>,
        unify: UnifyMode,
    ) -> Result<(), BackendError>;

    /// Writes the staged delta to stable storage.
    fn flush_delta(&self, claim: &FlushClaim<'_>) -> Result<(), BackendError>;
}

/// The host side of a host-driven volume.
pub trait HostSync: Send + Sync {
    /// Returns true once the volume has finished mounting and replay.
    fn is_active(&self) -> bool;

    /// Syncs every dirty file of the volume through the host's own
    /// writeback path.
    ///
    /// Writeback started by the sweep must give up once `cancel` fires.
    fn sync_all(&self, cancel: &CancelToken) -> Result<(), BackendError>;
}

/// Reads the current delta number through a short-lived pin.
///
/// The pin is released straight away: the number is all the caller needs.
pub(crate) fn current_delta<B: DeltaBackend + ?Sized>(backend: &B, state: &DeltaState) -> Delta {
    let delta_ref = backend.acquire_delta();
    let delta = delta_ref.delta();
    backend.release_delta(state, delta_ref);
    delta
}
