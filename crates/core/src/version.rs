//! Optimistic concurrency token for catalog records.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Version token carried by every stored record.
///
/// A freshly inserted record starts at version 1; each successful update bumps
/// it by one. Updates must present the version they read, and the store rejects
/// the write when it no longer matches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectVersion(u64);

impl ObjectVersion {
    pub const INITIAL: ObjectVersion = ObjectVersion(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn matches(self, actual: ObjectVersion) -> bool {
        self == actual
    }

    pub fn check(self, actual: ObjectVersion) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {}, actual: {})",
                self.0, actual.0
            )))
        }
    }
}

impl Default for ObjectVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl core::fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
