/*!
 * ID Generation
 * Monotonic identity generators for revisions and attach sessions
 */

use super::types::ReJitId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Generic ID generator interface
pub trait IdGenerator<T> {
    /// Generate next ID
    fn next(&self) -> T;

    /// Get current counter value (for debugging)
    fn current(&self) -> T;
}

/// High-performance atomic counter
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Lock-free, never recycles (identities must not be reused)
#[repr(C, align(64))]
pub struct AtomicGenerator<T> {
    counter: Arc<AtomicU64>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> AtomicGenerator<T> {
    /// Create new generator starting at given value
    #[inline]
    pub fn new(start: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(start)),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T> Clone for AtomicGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            _marker: std::marker::PhantomData,
        }
    }
}

impl IdGenerator<ReJitId> for AtomicGenerator<ReJitId> {
    #[inline]
    fn next(&self) -> ReJitId {
        ReJitId(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    #[inline]
    fn current(&self) -> ReJitId {
        ReJitId(self.counter.load(Ordering::Relaxed))
    }
}

/// Revision ids start at 1; 0 is the original code
pub fn rejit_id_generator() -> AtomicGenerator<ReJitId> {
    AtomicGenerator::new(1)
}

/// Identity of one attach session
///
/// Every capability handed to an observer is bound to the session that
/// created it, so a handle retained across detach/re-attach is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
