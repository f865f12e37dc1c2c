/*!
 * Read-Copy-Update (RCU) Pattern
 * Zero-contention reads for tables consulted on every engine event
 */

use arc_swap::{ArcSwap, Guard};
use std::sync::Arc;

/// RCU-protected value with lock-free reads
///
/// # Performance
///
/// - **Reads**: atomic pointer load, no lock, no reference count bump with `peek`
/// - **Writes**: clone-modify-swap; writers retry under contention
/// - **Best for**: read:write ratios well above 100:1, such as code-range lookups
pub struct RcuCell<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> RcuCell<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(value)),
        }
    }

    /// Load current value as an owned snapshot
    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Borrow current value without touching the reference count
    ///
    /// Keep the guard short-lived; it pins the snapshot.
    #[inline(always)]
    pub fn peek(&self) -> Guard<Arc<T>> {
        self.inner.load()
    }

    /// Update value using a function
    ///
    /// The function may be called multiple times if there's contention.
    #[inline]
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(&T) -> T,
    {
        self.inner.rcu(|old| f(old));
    }

    /// Update value and return a result computed from the winning attempt
    ///
    /// `f` returns `None` to abort the update.
    pub fn try_update<F, R>(&self, mut f: F) -> Option<R>
    where
        F: FnMut(&T) -> Option<(T, R)>,
    {
        loop {
            let current = self.inner.load_full();
            let (next, result) = f(&current)?;
            let prev = self.inner.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*prev, &current) {
                return Some(result);
            }
        }
    }

    /// Replace value entirely
    #[inline]
    pub fn store(&self, new_value: T) {
        self.inner.store(Arc::new(new_value));
    }
}

impl<T> Clone for RcuCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for RcuCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
