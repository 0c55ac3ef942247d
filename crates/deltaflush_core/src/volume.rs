//! Mounted-volume flusher.

use crate::backend::{DeltaBackend, HostSync};
use crate::cancel::CancelToken;
use crate::config::{FlushPolicyKind, FlusherConfig};
use crate::error::{FlushError, FlushResult};
use crate::policy::{ExplicitSyncEngine, FlushContext, FlushPolicy, HostDrivenEngine};
use crate::state::{DeltaSnapshot, DeltaState};
use crate::stats::{FlusherStats, StatsSnapshot};
use crate::types::{DrainOutcome, UnifyMode, WritebackBudget};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// The flusher of one mounted volume.
///
/// Owns the volume's [`DeltaState`] and the policy chosen at mount. It is
/// shared between writer, sync and writeback threads behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// let volume = Volume::mount(FlusherConfig::default(), backend, None)?;
/// volume.sync(UnifyMode::Allow)?;
/// volume.unmount();
/// ```
pub struct Volume {
    config: FlusherConfig,
    state: Arc<DeltaState>,
    stats: Arc<FlusherStats>,
    policy: Box<dyn FlushPolicy>,
    mounted: AtomicBool,
}

impl Volume {
    /// Mounts the flusher.
    ///
    /// `host` is required for [`FlushPolicyKind::HostDriven`] and ignored
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate or the
    /// host-driven policy is requested without a host.
    pub fn mount(
        config: FlusherConfig,
        backend: Arc<dyn DeltaBackend>,
        host: Option<Arc<dyn HostSync>>,
    ) -> FlushResult<Self> {
        config.validate()?;

        let state = Arc::new(DeltaState::new(config.initial()));
        let stats = Arc::new(FlusherStats::new());
        let ctx = FlushContext::new(Arc::clone(&state), backend, Arc::clone(&stats));

        let policy: Box<dyn FlushPolicy> = match config.policy {
            FlushPolicyKind::Explicit => Box::new(ExplicitSyncEngine::new(ctx)),
            FlushPolicyKind::HostDriven => {
                let host = host.ok_or_else(|| {
                    FlushError::invalid_config("host-driven policy requires a host")
                })?;
                Box::new(HostDrivenEngine::new(ctx, host))
            }
        };

        info!(
            policy = ?config.policy,
            initial_delta = config.initial_delta,
            host_writeback = policy.host_writeback_enabled(),
            "flusher mounted"
        );

        Ok(Self {
            config,
            state,
            stats,
            policy,
            mounted: AtomicBool::new(true),
        })
    }

    /// Returns the configuration the volume was mounted with.
    #[must_use]
    pub fn config(&self) -> &FlusherConfig {
        &self.config
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy_kind(&self) -> FlushPolicyKind {
        self.policy.kind()
    }

    /// Returns the shared delta state.
    #[must_use]
    pub fn state(&self) -> &Arc<DeltaState> {
        &self.state
    }

    /// Returns the current counters and flags.
    #[must_use]
    pub fn snapshot(&self) -> DeltaSnapshot {
        self.state.snapshot()
    }

    /// Returns the flusher statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns true until [`unmount`](Self::unmount) is called.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Returns whether the host should schedule periodic writeback.
    #[must_use]
    pub fn host_writeback_enabled(&self) -> bool {
        self.policy.host_writeback_enabled()
    }

    /// Makes the current delta durable, using the configured sync timeout.
    pub fn sync(&self, unify: UnifyMode) -> FlushResult<()> {
        self.sync_with(unify, &CancelToken::from_timeout(self.config.sync_timeout))
    }

    /// Makes the current delta durable, interruptible through `cancel`.
    pub fn sync_with(&self, unify: UnifyMode, cancel: &CancelToken) -> FlushResult<()> {
        self.check_mounted()?;
        self.policy.sync(unify, cancel)
    }

    /// Periodic writeback entry point, using the configured drain timeout.
    pub fn writeback(&self, budget: WritebackBudget) -> FlushResult<DrainOutcome> {
        self.writeback_with(budget, &CancelToken::from_timeout(self.config.drain_timeout))
    }

    /// Periodic writeback entry point, interruptible through `cancel`.
    pub fn writeback_with(
        &self,
        budget: WritebackBudget,
        cancel: &CancelToken,
    ) -> FlushResult<DrainOutcome> {
        self.check_mounted()?;
        self.policy.drain(budget, cancel)
    }

    /// Starts a transition if none is running, without waiting.
    pub fn try_transition(&self, unify: UnifyMode) -> FlushResult<()> {
        self.check_mounted()?;
        self.policy.try_transition(unify)
    }

    /// Wakes every waiter.
    pub fn schedule_flush(&self) {
        self.policy.schedule_flush();
    }

    /// Stops accepting sync and writeback calls.
    ///
    /// Waits already in progress are woken once and finish normally.
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::AcqRel) {
            self.policy.schedule_flush();
            info!(
                staging = self.state.staging().as_u32(),
                committed = self.state.committed().as_u32(),
                "flusher unmounted"
            );
        }
    }

    fn check_mounted(&self) -> FlushResult<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(FlushError::invalid_operation("volume is unmounted"))
        }
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("policy", &self.policy_kind())
            .field("state", &self.state)
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockBackend, MockHost};
    use crate::types::Delta;
    use crate::waiter::SyncWaiter;
    use std::thread;
    use std::time::{Duration, Instant};

    fn backend(current: u32) -> Arc<dyn DeltaBackend> {
        Arc::new(MockBackend::new(current))
    }

    fn host_driven_config() -> FlusherConfig {
        FlusherConfig::new().policy(FlushPolicyKind::HostDriven)
    }

    #[test]
    fn mount_explicit() {
        let volume =
            Volume::mount(FlusherConfig::new().initial_delta(5), backend(6), None).unwrap();
        assert_eq!(volume.policy_kind(), FlushPolicyKind::Explicit);
        assert!(!volume.host_writeback_enabled());
        assert_eq!(volume.snapshot().staging, Delta::new(5));
    }

    #[test]
    fn host_driven_requires_host() {
        let config = host_driven_config();
        let err = Volume::mount(config, backend(2), None).unwrap_err();
        assert!(matches!(err, FlushError::InvalidConfig { .. }));
    }

    #[test]
    fn mount_host_driven() {
        let host: Arc<dyn HostSync> = Arc::new(MockHost::active());
        let volume = Volume::mount(host_driven_config(), backend(2), Some(host)).unwrap();
        assert_eq!(volume.policy_kind(), FlushPolicyKind::HostDriven);
        assert!(volume.host_writeback_enabled());
        let outcome = volume.writeback(WritebackBudget::new(16)).unwrap();
        assert!(outcome.progressed);
        assert_eq!(volume.snapshot().committed, Delta::new(2));
        assert_eq!(volume.stats().drains_run, 1);
    }

    #[test]
    fn sync_through_volume() {
        let volume =
            Volume::mount(FlusherConfig::new().initial_delta(5), backend(6), None).unwrap();
        volume.sync(UnifyMode::Allow).unwrap();
        assert_eq!(volume.snapshot().committed, Delta::new(6));
        assert_eq!(volume.stats().syncs_completed, 1);
    }

    #[test]
    fn unmounted_volume_refuses_calls() {
        let volume = Volume::mount(FlusherConfig::default(), backend(2), None).unwrap();
        volume.unmount();
        assert!(!volume.is_mounted());
        assert!(matches!(
            volume.sync(UnifyMode::Allow),
            Err(FlushError::InvalidOperation { .. })
        ));
        assert!(volume.writeback(WritebackBudget::new(1)).is_err());
        // Unmounting twice is harmless.
        volume.unmount();
    }

    /// Blocks a waiter on `flag`, which is set without a broadcast, then
    /// runs `wake` and returns what the waiter saw.
    fn waiter_woken_by(volume: &Volume, wake: impl FnOnce(&Volume)) -> FlushResult<()> {
        let flag = AtomicBool::new(false);
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                SyncWaiter::new(volume.state())
                    .wait_until(&CancelToken::with_timeout(Duration::from_secs(5)), || {
                        Ok(flag.load(Ordering::SeqCst))
                    })
            });
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
            let started = Instant::now();
            wake(volume);
            let result = waiter.join().unwrap();
            assert!(started.elapsed() < Duration::from_secs(2));
            result
        })
    }

    #[test]
    fn schedule_flush_wakes_blocked_waiter() {
        let volume = Volume::mount(FlusherConfig::default(), backend(2), None).unwrap();
        waiter_woken_by(&volume, Volume::schedule_flush).unwrap();
        assert!(volume.is_mounted());
    }

    #[test]
    fn unmount_wakes_blocked_waiter() {
        let host: Arc<dyn HostSync> = Arc::new(MockHost::active());
        let volume = Volume::mount(host_driven_config(), backend(2), Some(host)).unwrap();
        waiter_woken_by(&volume, Volume::unmount).unwrap();
        assert!(!volume.is_mounted());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = FlusherConfig::new().sync_timeout(Some(std::time::Duration::ZERO));
        assert!(Volume::mount(config, backend(2), None).is_err());
    }
}
