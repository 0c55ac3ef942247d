//! Test fixtures and volume helpers.
//!
//! Mounts a [`Volume`] over the simulated backend (and host, for the
//! host-driven policy) with the counters set to a chosen starting point.

use crate::sim::{SimBackend, SimHost};
use deltaflush_core::{Delta, DeltaBackend, FlushPolicyKind, FlusherConfig, HostSync, Volume};
use std::sync::Arc;

/// A mounted volume together with its simulated collaborators.
#[derive(Debug, Clone)]
pub struct TestVolume {
    /// The mounted volume.
    pub volume: Arc<Volume>,
    /// The backend the volume flushes through.
    pub backend: Arc<SimBackend>,
    /// The host, present for the host-driven policy.
    pub host: Option<Arc<SimHost>>,
}

impl TestVolume {
    /// Mounts an explicit-sync volume.
    ///
    /// `staging` and `committed` start at `staging`; writers start in
    /// `current`.
    pub fn explicit(staging: u32, current: u32) -> Self {
        Self::mount(
            FlusherConfig::new()
                .policy(FlushPolicyKind::Explicit)
                .initial_delta(staging),
            current,
            None,
        )
    }

    /// Mounts a host-driven volume whose host starts `active` or not.
    pub fn host_driven(staging: u32, current: u32, active: bool) -> Self {
        Self::mount(
            FlusherConfig::new()
                .policy(FlushPolicyKind::HostDriven)
                .initial_delta(staging),
            current,
            Some(Arc::new(SimHost::new(active))),
        )
    }

    /// Mounts with an arbitrary configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is rejected.
    pub fn mount(config: FlusherConfig, current: u32, host: Option<Arc<SimHost>>) -> Self {
        let backend = Arc::new(SimBackend::new(Delta::new(current)));
        let volume = Volume::mount(
            config,
            Arc::clone(&backend) as Arc<dyn DeltaBackend>,
            host.clone().map(|h| h as Arc<dyn HostSync>),
        )
        .expect("Failed to mount test volume");
        let volume = Arc::new(volume);
        if let Some(host) = &host {
            host.attach(Arc::downgrade(&volume), Arc::downgrade(&backend));
        }
        Self {
            volume,
            backend,
            host,
        }
    }

    /// Returns the host.
    ///
    /// # Panics
    ///
    /// Panics for an explicit-sync volume.
    pub fn host(&self) -> &Arc<SimHost> {
        self.host.as_ref().expect("volume has no host")
    }

    /// Checks `committed ≤ staging ≤ current`.
    pub fn invariant_holds(&self) -> bool {
        self.backend.check_invariant(self.volume.state())
    }
}

impl std::ops::Deref for TestVolume {
    type Target = Volume;

    fn deref(&self) -> &Self::Target {
        &self.volume
    }
}

/// Runs `f` against a fresh explicit-sync volume and unmounts it afterwards.
pub fn with_explicit_volume<F, R>(staging: u32, current: u32, f: F) -> R
where
    F: FnOnce(&TestVolume) -> R,
{
    let tv = TestVolume::explicit(staging, current);
    let result = f(&tv);
    tv.volume.unmount();
    result
}
