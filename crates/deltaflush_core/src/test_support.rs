//! Minimal backend for unit tests.

use crate::backend::{DeltaBackend, DeltaRef, HostSync};
use crate::cancel::CancelToken;
use crate::error::BackendError;
use crate::state::{DeltaState, FlushClaim, TransitionRun};
use crate::types::{Delta, UnifyMode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Backend whose staged delta is ready as soon as it is staged.
#[derive(Debug)]
pub(crate) struct MockBackend {
    pub current: AtomicU32,
    pub transitions: AtomicUsize,
    pub flushes: AtomicUsize,
    pub fail_transition: AtomicBool,
    pub fail_flush: AtomicBool,
    pub unify_seen: Mutex<Vec<UnifyMode>>,
}

impl MockBackend {
    pub fn new(current: u32) -> Self {
        Self {
            current: AtomicU32::new(current),
            transitions: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            fail_transition: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
            unify_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn transitions(&self) -> usize {
        self.transitions.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl DeltaBackend for MockBackend {
    fn acquire_delta(&self) -> DeltaRef {
        DeltaRef::new(Delta::new(self.current.load(Ordering::SeqCst)))
    }

    fn release_delta(&self, _state: &DeltaState, _delta_ref: DeltaRef) {}

    fn delta_transition(
        &self,
        run: TransitionRun<'_>,
        unify: UnifyMode,
    ) -> Result<(), BackendError> {
        self.transitions.fetch_add(1, Ordering::SeqCst);
        self.unify_seen.lock().push(unify);
        if self.fail_transition.load(Ordering::SeqCst) {
            return Err(BackendError::transition("injected"));
        }
        let staged = self.current.fetch_add(1, Ordering::SeqCst);
        run.advance_staging(Delta::new(staged));
        run.mark_flush_pending();
        run.finish();
        Ok(())
    }

    fn flush_delta(&self, claim: &FlushClaim<'_>) -> Result<(), BackendError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(BackendError::flush("injected"));
        }
        claim.advance_committed(claim.state().staging());
        Ok(())
    }
}

/// Host with a settable active flag that counts sweeps.
#[derive(Debug, Default)]
pub(crate) struct MockHost {
    pub active: AtomicBool,
    pub sweeps: AtomicUsize,
    pub fail_sweep: AtomicBool,
}

impl MockHost {
    pub fn active() -> Self {
        Self {
            active: AtomicBool::new(true),
            ..Self::default()
        }
    }
}

impl HostSync for MockHost {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn sync_all(&self, _cancel: &CancelToken) -> Result<(), BackendError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        if self.fail_sweep.load(Ordering::SeqCst) {
            return Err(BackendError::host_sync("injected"));
        }
        Ok(())
    }
}
