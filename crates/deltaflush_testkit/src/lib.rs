//! # Deltaflush Testkit
//!
//! Test utilities for deltaflush.
//!
//! This crate provides:
//! - A simulated delta backend with per-delta reference counts and fault
//!   injection
//! - A simulated host whose sweep drives the volume's writeback
//! - Volume fixtures for both flush policies
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deltaflush_testkit::prelude::*;
//!
//! #[test]
//! fn sync_commits_current() {
//!     let tv = TestVolume::explicit(1, 2);
//!     tv.sync(UnifyMode::Allow).unwrap();
//!     assert!(tv.invariant_holds());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod sim;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::sim::*;
    pub use crate::stress::*;
    pub use deltaflush_core::{
        CancelToken, Delta, DeltaBackend, FlushError, FlushPolicyKind, FlusherConfig,
        UnifyMode, WritebackBudget,
    };
}

pub use fixtures::*;
pub use sim::*;
pub use stress::*;
