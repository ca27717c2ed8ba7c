//! Epoch coordination for cancelable typechecking
//!
//! This module implements the protocol that lets a long-running whole-program
//! typecheck (the slow path) be canceled by newly arriving edits while short
//! incremental typechecks (fast paths) keep committing. Epochs identify
//! individual attempts; the [`TypecheckEpochManager`] tracks which epoch is
//! committed, which is being processed, and which one a cancellation wants to
//! jump to.

mod manager;
mod preemption;

pub use manager::{TypecheckEpochManager, TypecheckingStatus};
pub use preemption::PreemptionTaskManager;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier for a single fast- or slow-path typecheck attempt.
///
/// Callers allocate epochs monotonically, but the value is stored as a
/// wrapping 32-bit counter, so two epochs can only ever be compared for
/// equality. The type intentionally does not implement `Ord`; after a wrap,
/// a numerically smaller epoch is the newer one.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct Epoch(u32);

impl Epoch {
    /// Create an epoch from its raw counter value.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw counter value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The epoch allocated after this one, wrapping at `u32::MAX`.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Epoch {
    #[inline]
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Epoch> for u32 {
    #[inline]
    fn from(epoch: Epoch) -> Self {
        epoch.0
    }
}

/// Atomic cell holding an [`Epoch`].
#[repr(transparent)]
pub struct AtomicEpoch {
    raw: AtomicU32,
}

impl AtomicEpoch {
    /// Create a new atomic epoch cell.
    #[inline]
    pub const fn new(epoch: Epoch) -> Self {
        Self {
            raw: AtomicU32::new(epoch.0),
        }
    }

    /// Load the epoch atomically.
    #[inline]
    pub fn load(&self, ordering: Ordering) -> Epoch {
        Epoch(self.raw.load(ordering))
    }

    /// Store an epoch atomically.
    #[inline]
    pub fn store(&self, epoch: Epoch, ordering: Ordering) {
        self.raw.store(epoch.0, ordering);
    }
}

impl fmt::Debug for AtomicEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicEpoch")
            .field(&self.load(Ordering::Acquire))
            .finish()
    }
}
