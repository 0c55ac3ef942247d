//! Flusher configuration.

use crate::error::{FlushError, FlushResult};
use crate::types::Delta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which flush policy a volume runs.
///
/// Chosen once at mount and never changed while the volume is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicyKind {
    /// Callers drive transition and flush themselves; host writeback is off.
    #[default]
    Explicit,
    /// The host's periodic writeback drains deltas; full sync is delegated
    /// to the host's per-file sweep.
    HostDriven,
}

/// Configuration for mounting a volume's flusher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlusherConfig {
    /// Flush policy.
    pub policy: FlushPolicyKind,

    /// Delta number the staging and committed counters start at.
    pub initial_delta: u32,

    /// Deadline applied to `Volume::sync` when the caller brings no token.
    pub sync_timeout: Option<Duration>,

    /// Deadline applied to `Volume::writeback` when the caller brings no token.
    pub drain_timeout: Option<Duration>,
}

impl Default for FlusherConfig {
    fn default() -> Self {
        Self {
            policy: FlushPolicyKind::Explicit,
            initial_delta: 1,
            sync_timeout: None,
            drain_timeout: None,
        }
    }
}

impl FlusherConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flush policy.
    #[must_use]
    pub const fn policy(mut self, policy: FlushPolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the initial delta number.
    #[must_use]
    pub const fn initial_delta(mut self, delta: u32) -> Self {
        self.initial_delta = delta;
        self
    }

    /// Sets the default deadline for full syncs.
    #[must_use]
    pub const fn sync_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Sets the default deadline for periodic drains.
    #[must_use]
    pub const fn drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Returns the initial delta as a [`Delta`].
    #[must_use]
    pub const fn initial(&self) -> Delta {
        Delta::new(self.initial_delta)
    }

    /// Checks the configuration for values that can never work.
    pub fn validate(&self) -> FlushResult<()> {
        if self.sync_timeout == Some(Duration::ZERO) {
            return Err(FlushError::invalid_config("sync_timeout must be non-zero"));
        }
        if self.drain_timeout == Some(Duration::ZERO) {
            return Err(FlushError::invalid_config("drain_timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = FlusherConfig::default();
        assert_eq!(config.policy, FlushPolicyKind::Explicit);
        assert_eq!(config.initial(), Delta::new(1));
        assert!(config.sync_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = FlusherConfig::new()
            .policy(FlushPolicyKind::HostDriven)
            .initial_delta(5)
            .sync_timeout(Some(Duration::from_secs(2)));

        assert_eq!(config.policy, FlushPolicyKind::HostDriven);
        assert_eq!(config.initial_delta, 5);
        assert_eq!(config.sync_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = FlusherConfig::new().drain_timeout(Some(Duration::ZERO));
        assert!(matches!(
            config.validate(),
            Err(FlushError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: FlusherConfig =
            serde_json::from_str(r#"{"policy":"host_driven","initial_delta":9}"#).unwrap();
        assert_eq!(config.policy, FlushPolicyKind::HostDriven);
        assert_eq!(config.initial_delta, 9);
        assert!(config.drain_timeout.is_none());
    }
}
