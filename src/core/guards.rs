/*!
 * RAII Guards
 *
 * Scoped bookkeeping released automatically on drop, including during unwinding
 */

use std::sync::atomic::{AtomicUsize, Ordering};

/// Core guard trait
pub trait Guard {
    /// Resource type name for logging/debugging
    fn resource_type(&self) -> &'static str;

    /// Check if guard is still active
    fn is_active(&self) -> bool;
}

/// Counts an activity for as long as the guard lives
///
/// Used for in-flight callbacks, active walks and compilations: detach is
/// only confirmed once every counter has drained to zero.
pub struct CounterGuard<'a> {
    counter: &'a AtomicUsize,
    kind: &'static str,
    active: bool,
}

impl<'a> CounterGuard<'a> {
    #[inline]
    pub fn enter(counter: &'a AtomicUsize, kind: &'static str) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
            kind,
            active: true,
        }
    }
}

impl Guard for CounterGuard<'_> {
    fn resource_type(&self) -> &'static str {
        self.kind
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for CounterGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        if self.active {
            self.counter.fetch_sub(1, Ordering::SeqCst);
            self.active = false;
        }
    }
}

/// Runs a closure on drop unless defused
pub struct OnDrop<F: FnOnce()> {
    action: Option<F>,
    kind: &'static str,
}

impl<F: FnOnce()> OnDrop<F> {
    pub fn new(kind: &'static str, action: F) -> Self {
        Self {
            action: Some(action),
            kind,
        }
    }

    /// Cancel the pending action
    pub fn defuse(mut self) {
        self.action = None;
    }
}

impl<F: FnOnce()> Guard for OnDrop<F> {
    fn resource_type(&self) -> &'static str {
        self.kind
    }

    fn is_active(&self) -> bool {
        self.action.is_some()
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}
