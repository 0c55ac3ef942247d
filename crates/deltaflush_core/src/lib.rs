//! # Deltaflush Core
//!
//! Commit/flush coordination for delta-batched storage.
//!
//! Writers accumulate changes into the *current* delta. This crate decides,
//! under concurrency, when that delta is sealed and staged (a *transition*),
//! when a staged delta is written out (a *flush*), and how callers that need
//! durability wait for it.
//!
//! This crate provides:
//! - [`DeltaState`]: per-volume counters, flags and broadcast channel
//! - [`TransitionCoordinator`]: elects one caller to run a transition
//! - [`CommitFlusher`]: claims and runs the pending flush
//! - [`SyncWaiter`]: cancellable wait, re-checked on every broadcast
//! - [`ExplicitSyncEngine`] and [`HostDrivenEngine`]: the two flush policies
//! - [`Volume`]: a mounted volume running one policy
//!
//! ## Key Invariants
//!
//! - `committed ≤ staging ≤ current`, compared circularly ([`Delta::is_after_eq`])
//! - At most one transition runs at a time
//! - Each setting of flush-pending is claimed by exactly one flusher
//! - Waiting for an already-reached delta returns without calling the backend
//! - A cancelled wait changes nothing
//!
//! There is no background thread. Whoever wins a flag does the work.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cancel;
mod config;
mod error;
mod event;
mod flusher;
mod policy;
mod state;
mod stats;
mod transition;
mod types;
mod volume;
mod waiter;

#[cfg(test)]
mod test_support;

pub use backend::{DeltaBackend, DeltaRef, HostSync};
pub use cancel::CancelToken;
pub use config::{FlushPolicyKind, FlusherConfig};
pub use error::{BackendError, FlushError, FlushResult};
pub use event::DeltaEvent;
pub use flusher::CommitFlusher;
pub use policy::{ExplicitSyncEngine, FlushContext, FlushPolicy, HostDrivenEngine};
pub use state::{DeltaSnapshot, DeltaState, FlushClaim, TransitionRun};
pub use stats::{FlusherStats, StatsSnapshot};
pub use transition::TransitionCoordinator;
pub use types::{Delta, DrainOutcome, UnifyMode, WritebackBudget};
pub use volume::Volume;
pub use waiter::SyncWaiter;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
