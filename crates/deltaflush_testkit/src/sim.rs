//! Simulated collaborators.
//!
//! [`SimBackend`] tracks a real current delta with per-delta reference
//! counts, the way a writer-side delta tracker would. A staged delta becomes
//! ready to flush once every writer pinned to it has released its reference.

use deltaflush_core::{
    BackendError, CancelToken, Delta, DeltaBackend, DeltaRef, DeltaState, FlushClaim, HostSync,
    TransitionRun, UnifyMode, Volume, WritebackBudget,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{OnceLock, Weak};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct SimDeltas {
    /// Delta accepting new writes.
    current: Delta,
    /// Outstanding references per delta.
    refs: HashMap<u32, usize>,
    /// Staged deltas still referenced by writers, oldest first.
    draining: VecDeque<Delta>,
    /// Newest staged delta with no references left.
    ready: Option<Delta>,
    /// Writes attached to each delta, for reporting.
    writes: HashMap<u32, u64>,
}

impl SimDeltas {
    /// Moves fully released deltas from `draining` to `ready`.
    ///
    /// Returns true if `ready` advanced.
    fn promote(&mut self) -> bool {
        let mut advanced = false;
        while let Some(&front) = self.draining.front() {
            if self.refs.get(&front.as_u32()).copied().unwrap_or(0) != 0 {
                break;
            }
            self.draining.pop_front();
            self.ready = Some(front);
            advanced = true;
        }
        advanced
    }
}

/// In-memory [`DeltaBackend`] with fault injection.
#[derive(Debug)]
pub struct SimBackend {
    deltas: Mutex<SimDeltas>,
    transitions: AtomicUsize,
    flushes: AtomicUsize,
    fail_transitions: AtomicUsize,
    fail_flushes: AtomicUsize,
    latency_us: AtomicU64,
    unify_seen: Mutex<Vec<UnifyMode>>,
}

impl SimBackend {
    /// Creates a backend whose current delta is `current`.
    #[must_use]
    pub fn new(current: Delta) -> Self {
        Self {
            deltas: Mutex::new(SimDeltas {
                current,
                refs: HashMap::new(),
                draining: VecDeque::new(),
                ready: None,
                writes: HashMap::new(),
            }),
            transitions: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            fail_transitions: AtomicUsize::new(0),
            fail_flushes: AtomicUsize::new(0),
            latency_us: AtomicU64::new(0),
            unify_seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the delta currently accepting writes.
    #[must_use]
    pub fn current(&self) -> Delta {
        self.deltas.lock().current
    }

    /// Number of transitions executed.
    #[must_use]
    pub fn transition_calls(&self) -> usize {
        self.transitions.load(Ordering::SeqCst)
    }

    /// Number of flushes executed.
    #[must_use]
    pub fn flush_calls(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Unify hints received by transitions, in call order.
    #[must_use]
    pub fn unify_hints(&self) -> Vec<UnifyMode> {
        self.unify_seen.lock().clone()
    }

    /// Makes the next `count` transitions fail.
    pub fn fail_next_transitions(&self, count: usize) {
        self.fail_transitions.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` flushes fail.
    pub fn fail_next_flushes(&self, count: usize) {
        self.fail_flushes.store(count, Ordering::SeqCst);
    }

    /// Adds `latency` to every transition and flush, to widen race windows.
    pub fn set_latency(&self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.store(us, Ordering::SeqCst);
    }

    /// Pins the current delta and records one write against it.
    ///
    /// The caller must hand the reference back with
    /// [`DeltaBackend::release_delta`].
    pub fn begin_write(&self) -> DeltaRef {
        let delta_ref = self.acquire_delta();
        *self
            .deltas
            .lock()
            .writes
            .entry(delta_ref.delta().as_u32())
            .or_default() += 1;
        delta_ref
    }

    /// Total writes recorded across all deltas.
    #[must_use]
    pub fn total_writes(&self) -> u64 {
        self.deltas.lock().writes.values().sum()
    }

    /// Returns true if some write landed in a delta that is not committed
    /// yet.
    #[must_use]
    pub fn has_dirty_writes(&self, state: &DeltaState) -> bool {
        let committed = state.committed();
        self.deltas
            .lock()
            .writes
            .iter()
            .any(|(&delta, &count)| count > 0 && Delta::new(delta).is_after(committed))
    }

    /// Checks `committed ≤ staging ≤ current` against `state`.
    #[must_use]
    pub fn check_invariant(&self, state: &DeltaState) -> bool {
        // Read in the order the values advance so a concurrent update can
        // only make the check more lenient, never fail it spuriously.
        let committed = state.committed();
        let staging = state.staging();
        let current = self.current();
        staging.is_after_eq(committed) && current.is_after_eq(staging)
    }

    fn simulate_latency(&self) {
        let us = self.latency_us.load(Ordering::Relaxed);
        if us > 0 {
            thread::sleep(Duration::from_micros(us));
        }
    }

    fn take_fault(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DeltaBackend for SimBackend {
    fn acquire_delta(&self) -> DeltaRef {
        let mut deltas = self.deltas.lock();
        let current = deltas.current;
        *deltas.refs.entry(current.as_u32()).or_default() += 1;
        DeltaRef::new(current)
    }

    fn release_delta(&self, state: &DeltaState, delta_ref: DeltaRef) {
        let mut deltas = self.deltas.lock();
        let key = delta_ref.delta().as_u32();
        if let Some(count) = deltas.refs.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                deltas.refs.remove(&key);
            }
        }
        if deltas.promote() {
            // Last reference of a staged delta is gone.
            state.mark_flush_pending();
        }
    }

    fn delta_transition(
        &self,
        run: TransitionRun<'_>,
        unify: UnifyMode,
    ) -> Result<(), BackendError> {
        self.transitions.fetch_add(1, Ordering::SeqCst);
        self.unify_seen.lock().push(unify);
        self.simulate_latency();
        if Self::take_fault(&self.fail_transitions) {
            return Err(BackendError::transition("injected transition failure"));
        }

        let mut deltas = self.deltas.lock();
        let staged = deltas.current;
        deltas.current = staged.next();
        deltas.draining.push_back(staged);
        run.advance_staging(staged);
        if deltas.promote() {
            run.mark_flush_pending();
        }
        drop(deltas);
        run.finish();
        Ok(())
    }

    fn flush_delta(&self, claim: &FlushClaim<'_>) -> Result<(), BackendError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency();
        if Self::take_fault(&self.fail_flushes) {
            return Err(BackendError::flush("injected flush failure"));
        }

        let ready = self.deltas.lock().ready;
        if let Some(delta) = ready {
            if delta.is_after(claim.state().committed()) {
                claim.advance_committed(delta);
            }
        }
        Ok(())
    }
}

/// [`HostSync`] whose sweep runs one writeback pass on the attached volume.
///
/// Like a per-file sweep skipping clean files, the pass only runs while the
/// backend holds uncommitted writes.
#[derive(Debug, Default)]
pub struct SimHost {
    active: AtomicBool,
    sweeps: AtomicUsize,
    fail_sweeps: AtomicBool,
    target: OnceLock<(Weak<Volume>, Weak<SimBackend>)>,
}

impl SimHost {
    /// Creates a host with the given active flag.
    #[must_use]
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            ..Self::default()
        }
    }

    /// Connects the sweep to `volume` and the backend it flushes through.
    /// Only the first call has an effect.
    pub fn attach(&self, volume: Weak<Volume>, backend: Weak<SimBackend>) {
        let _ = self.target.set((volume, backend));
    }

    /// Sets the active flag, as the end of replay would.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Makes every sweep fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.fail_sweeps.store(failing, Ordering::SeqCst);
    }

    /// Number of sweeps run.
    #[must_use]
    pub fn sweep_calls(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }
}

impl HostSync for SimHost {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn sync_all(&self, cancel: &CancelToken) -> Result<(), BackendError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        if self.fail_sweeps.load(Ordering::SeqCst) {
            return Err(BackendError::host_sync("injected sweep failure"));
        }
        let Some((volume, backend)) = self.target.get() else {
            return Ok(());
        };
        let (Some(volume), Some(backend)) = (volume.upgrade(), backend.upgrade()) else {
            return Ok(());
        };
        if !backend.has_dirty_writes(volume.state()) {
            return Ok(());
        }
        volume
            .writeback_with(WritebackBudget::new(u64::MAX), cancel)
            .map(|_| ())
            .map_err(|err| BackendError::host_sync(err.to_string()))
    }
}
