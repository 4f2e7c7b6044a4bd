//! Versioned state roots and optimistic concurrency expectations.

use crate::error::{DomainError, DomainResult};

/// Versioned root of a consistency boundary.
///
/// An inventory record is the unit the ledger serializes writes on: every
/// committed mutation bumps its version by exactly one, which lets writers
/// detect that the state they validated against has moved on.
pub trait AggregateRoot {
    /// Strongly-typed identifier of the root.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the root identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the root's state.
    ///
    /// `0` means "never written".
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a versioned root.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (invariant checks still apply).
    Any,
    /// The root must not exist yet.
    Absent,
    /// Require the root to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation for state read at `version` (`0` for an absent root).
    pub fn observed(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::Absent
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Absent => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_zero_means_absent() {
        assert_eq!(ExpectedVersion::observed(0), ExpectedVersion::Absent);
        assert_eq!(ExpectedVersion::observed(3), ExpectedVersion::Exact(3));
    }

    #[test]
    fn check_reports_conflict_on_stale_version() {
        assert!(ExpectedVersion::Exact(2).check(2).is_ok());
        assert!(ExpectedVersion::Any.check(9).is_ok());
        match ExpectedVersion::Absent.check(1) {
            Err(DomainError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
