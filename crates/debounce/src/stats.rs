//! Dispatch counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the dispatcher front-end and its worker
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    invoked: AtomicU64,
    suppressed: AtomicU64,
    superseded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls accepted by `submit`
    pub submitted: u64,
    /// Calls handed to the callee (including ones that then failed)
    pub invoked: u64,
    /// Calls dropped because the key was already decided after they were submitted
    pub suppressed: u64,
    /// Calls dropped because a later call for the same key was waiting
    pub superseded: u64,
    /// Invocations that returned an error or panicked
    pub failed: u64,
}

impl DispatchStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo [`record_submitted`](Self::record_submitted) for a call the worker never received
    pub(crate) fn unrecord_submitted(&self) {
        self.submitted.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invoked(&self) {
        self.invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            invoked: self.invoked.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Submissions that have neither fired nor been dropped yet
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.invoked + self.suppressed + self.superseded)
    }
}
