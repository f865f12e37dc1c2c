/*!
 * Lock-Free Dispatch Statistics
 * Atomic counters for zero-contention stats tracking in the dispatch path
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub delivered: u64,
    pub suppressed: u64,
    pub callback_failures: u64,
    pub gate_defaults: u64,
    pub slow_callbacks: u64,
    pub gc_cycles: u64,
    pub walks: u64,
    pub walk_failures: u64,
    pub rejit_requests: u64,
    pub rejit_errors: u64,
}

/// Atomic dispatch statistics for lock-free updates
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - All operations use relaxed ordering
/// - Snapshot requires no synchronization
#[repr(C, align(64))]
pub struct AtomicDispatchStats {
    delivered: AtomicU64,
    suppressed: AtomicU64,
    callback_failures: AtomicU64,
    gate_defaults: AtomicU64,
    slow_callbacks: AtomicU64,
    gc_cycles: AtomicU64,
    walks: AtomicU64,
    walk_failures: AtomicU64,
    rejit_requests: AtomicU64,
    rejit_errors: AtomicU64,
}

impl AtomicDispatchStats {
    #[inline]
    pub const fn new() -> Self {
        Self {
            delivered: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
            gate_defaults: AtomicU64::new(0),
            slow_callbacks: AtomicU64::new(0),
            gc_cycles: AtomicU64::new(0),
            walks: AtomicU64::new(0),
            walk_failures: AtomicU64::new(0),
            rejit_requests: AtomicU64::new(0),
            rejit_errors: AtomicU64::new(0),
        }
    }

    /// # Performance
    /// Hot path - called on every delivered event
    #[inline(always)]
    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// # Performance
    /// Hot path - called on every masked-out event
    #[inline(always)]
    pub fn inc_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_callback_failures(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_gate_defaults(&self) {
        self.gate_defaults.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_slow_callbacks(&self) {
        self.slow_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_gc_cycles(&self) {
        self.gc_cycles.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_walks(&self) {
        self.walks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_walk_failures(&self) {
        self.walk_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_rejit_requests(&self, count: u64) {
        self.rejit_requests.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rejit_errors(&self) {
        self.rejit_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats (no locks required)
    ///
    /// # Note
    /// Values may not be perfectly consistent with each other due to concurrent updates,
    /// but each individual value is accurate.
    #[inline]
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            gate_defaults: self.gate_defaults.load(Ordering::Relaxed),
            slow_callbacks: self.slow_callbacks.load(Ordering::Relaxed),
            gc_cycles: self.gc_cycles.load(Ordering::Relaxed),
            walks: self.walks.load(Ordering::Relaxed),
            walk_failures: self.walk_failures.load(Ordering::Relaxed),
            rejit_requests: self.rejit_requests.load(Ordering::Relaxed),
            rejit_errors: self.rejit_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for AtomicDispatchStats {
    fn default() -> Self {
        Self::new()
    }
}
