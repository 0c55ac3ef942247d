//! Core type definitions for the delta flusher.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A delta number.
///
/// Delta numbers advance by one per transition and wrap around at `u32::MAX`.
/// They are deliberately not `Ord`: two deltas may only be compared with
/// [`Delta::is_after_eq`], which treats the number space as a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delta(pub u32);

impl Delta {
    /// Creates a new delta number.
    #[must_use]
    pub const fn new(delta: u32) -> Self {
        Self(delta)
    }

    /// Returns the raw delta value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the following delta, wrapping at the end of the number space.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns true if `self` is the same delta as `other` or comes after it.
    ///
    /// The distance is taken modulo 2^32 and read as signed, so a delta just
    /// below `u32::MAX` precedes a small delta reached after wrapping.
    #[must_use]
    pub const fn is_after_eq(self, other: Self) -> bool {
        (self.0.wrapping_sub(other.0) as i32) >= 0
    }

    /// Returns true if `self` comes strictly after `other`.
    #[must_use]
    pub const fn is_after(self, other: Self) -> bool {
        (self.0.wrapping_sub(other.0) as i32) > 0
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delta:{}", self.0)
    }
}

/// Merge hint forwarded to the transition.
///
/// Controls whether the backend may combine the staged delta with adjacent
/// ones. The coordinator never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifyMode {
    /// Never merge.
    Forbid,
    /// Merge when the backend sees fit.
    #[default]
    Allow,
    /// Always merge.
    Force,
}

impl fmt::Display for UnifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Forbid => "forbid",
            Self::Allow => "allow",
            Self::Force => "force",
        };
        f.write_str(name)
    }
}

/// Page budget handed to a periodic drain by the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WritebackBudget {
    /// Pages the host would like written in this call.
    pub nr_pages: u64,
}

impl WritebackBudget {
    /// Creates a budget of `nr_pages` pages.
    #[must_use]
    pub const fn new(nr_pages: u64) -> Self {
        Self { nr_pages }
    }
}

/// Result of one periodic drain call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Pages charged against the budget. Always zero: delta flushing does
    /// not take part in host I/O accounting.
    pub pages_consumed: u64,
    /// Whether the drain did any work. The host calls again while this is set.
    pub progressed: bool,
}

impl DrainOutcome {
    /// Outcome of a drain that did nothing.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            pages_consumed: 0,
            progressed: false,
        }
    }

    /// Outcome of a drain that made progress.
    #[must_use]
    pub const fn progressed() -> Self {
        Self {
            pages_consumed: 0,
            progressed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn after_eq_is_reflexive() {
        let d = Delta::new(42);
        assert!(d.is_after_eq(d));
        assert!(!d.is_after(d));
    }

    #[test]
    fn after_eq_plain_order() {
        assert!(Delta::new(6).is_after_eq(Delta::new(5)));
        assert!(!Delta::new(5).is_after_eq(Delta::new(6)));
    }

    #[test]
    fn after_eq_across_wraparound() {
        let near_max = Delta::new(u32::MAX - 1);
        let wrapped = near_max.next().next().next();
        assert_eq!(wrapped.as_u32(), 1);
        assert!(wrapped.is_after_eq(near_max));
        assert!(!near_max.is_after_eq(wrapped));
        assert!(wrapped.is_after(near_max));
    }

    #[test]
    fn next_wraps_to_zero() {
        assert_eq!(Delta::new(u32::MAX).next(), Delta::new(0));
    }

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", Delta::new(7)), "delta:7");
        assert_eq!(format!("{}", UnifyMode::Force), "force");
    }

    #[test]
    fn drain_outcomes() {
        assert!(!DrainOutcome::idle().progressed);
        assert!(DrainOutcome::progressed().progressed);
        assert_eq!(DrainOutcome::progressed().pages_consumed, 0);
    }

    proptest! {
        #[test]
        fn successor_is_after(base in any::<u32>(), step in 1u32..(1 << 31)) {
            let a = Delta::new(base);
            let b = Delta::new(base.wrapping_add(step));
            prop_assert!(b.is_after(a));
            prop_assert!(!a.is_after_eq(b));
        }

        #[test]
        fn exactly_one_direction_holds(x in any::<u32>(), y in any::<u32>()) {
            let a = Delta::new(x);
            let b = Delta::new(y);
            // Half-way points are the one ambiguous distance.
            prop_assume!(x.wrapping_sub(y) != 1 << 31);
            if a == b {
                prop_assert!(a.is_after_eq(b) && b.is_after_eq(a));
            } else {
                prop_assert!(a.is_after_eq(b) != b.is_after_eq(a));
            }
        }
    }
}
