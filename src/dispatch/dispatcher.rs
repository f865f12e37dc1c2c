/*!
 * Callback Dispatcher
 *
 * Single chokepoint between engine events and the observer. The mask test
 * comes first and is one atomic load; argument preparation only runs for
 * enabled categories. Delivery is synchronous on the raising thread and
 * takes no lock: the observer slot is an atomic pointer.
 */

use crate::callbacks::CallbackSet;
use crate::core::errors::{CallbackError, CallbackResult};
use crate::core::guards::CounterGuard;
use crate::core::limits::SLOW_CALLBACK_THRESHOLD;
use crate::mask::{EventCategory, EventMaskRegistry};
use crate::monitoring::AtomicDispatchStats;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// What happened to one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched<R> {
    /// Category disabled or no observer; nothing was built or called
    Suppressed,
    Delivered(R),
    /// The observer returned a failure; never propagated to the engine
    Failed(CallbackError),
}

impl<R> Dispatched<R> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Dispatched::Delivered(_))
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Dispatched::Suppressed)
    }
}

pub struct Dispatcher {
    mask: EventMaskRegistry,
    observer: ArcSwapOption<CallbackSet>,
    in_flight: AtomicUsize,
    stats: AtomicDispatchStats,
    slow_threshold: Duration,
}

impl Dispatcher {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            mask: EventMaskRegistry::new(),
            observer: ArcSwapOption::empty(),
            in_flight: AtomicUsize::new(0),
            stats: AtomicDispatchStats::new(),
            slow_threshold,
        }
    }

    #[inline]
    pub fn mask(&self) -> &EventMaskRegistry {
        &self.mask
    }

    #[inline]
    pub fn stats(&self) -> &AtomicDispatchStats {
        &self.stats
    }

    /// Callbacks currently executing on any thread
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    #[inline(always)]
    pub fn is_enabled(&self, category: EventCategory) -> bool {
        self.mask.is_enabled(category)
    }

    pub fn observer(&self) -> Option<Arc<CallbackSet>> {
        self.observer.load_full()
    }

    pub(crate) fn install(&self, set: CallbackSet) {
        self.observer.store(Some(Arc::new(set)));
    }

    pub(crate) fn uninstall(&self) -> Option<Arc<CallbackSet>> {
        self.observer.swap(None)
    }

    /// Take the observer out of the slot if no callback is running
    ///
    /// Deliveries count themselves in-flight before loading the observer, so
    /// after the swap a zero count means nobody can still be holding it.
    pub(crate) fn try_quiesce(&self) -> Option<Arc<CallbackSet>> {
        let taken = self.observer.swap(None)?;
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            return Some(taken);
        }
        self.observer.store(Some(taken));
        None
    }

    /// Deliver a gated event
    ///
    /// `build` prepares the arguments and only runs when the category is
    /// enabled and an observer is installed.
    #[inline]
    pub fn dispatch<A, R, B, D>(&self, category: EventCategory, build: B, deliver: D) -> Dispatched<R>
    where
        B: FnOnce() -> A,
        D: FnOnce(&CallbackSet, A) -> CallbackResult<R>,
    {
        if !self.mask.is_enabled(category) {
            self.stats.inc_suppressed();
            return Dispatched::Suppressed;
        }
        self.deliver(category.name(), build, deliver)
    }

    /// Deliver regardless of the mask (attach, detach and shutdown notifications)
    pub fn dispatch_mandatory<A, R, B, D>(&self, event: &'static str, build: B, deliver: D) -> Dispatched<R>
    where
        B: FnOnce() -> A,
        D: FnOnce(&CallbackSet, A) -> CallbackResult<R>,
    {
        self.deliver(event, build, deliver)
    }

    /// Reduce a gate callback to the engine's decision
    ///
    /// Disabled gates keep the engine's normal behavior; failed ones fall back
    /// to the conservative answer.
    pub fn resolve_gate(&self, outcome: Dispatched<bool>, when_suppressed: bool, conservative: bool) -> bool {
        match outcome {
            Dispatched::Suppressed => when_suppressed,
            Dispatched::Delivered(answer) => answer,
            Dispatched::Failed(_) => {
                self.stats.inc_gate_defaults();
                conservative
            }
        }
    }

    /// Run `deliver` against an observer already taken out of the slot
    pub(crate) fn deliver_to<R, D>(&self, set: &CallbackSet, event: &'static str, deliver: D) -> Dispatched<R>
    where
        D: FnOnce(&CallbackSet) -> CallbackResult<R>,
    {
        let _in_flight = CounterGuard::enter(&self.in_flight, "callback");
        self.invoke(set, event, deliver)
    }

    fn deliver<A, R, B, D>(&self, event: &'static str, build: B, deliver: D) -> Dispatched<R>
    where
        B: FnOnce() -> A,
        D: FnOnce(&CallbackSet, A) -> CallbackResult<R>,
    {
        let _in_flight = CounterGuard::enter(&self.in_flight, "callback");
        let Some(set) = self.observer.load_full() else {
            self.stats.inc_suppressed();
            return Dispatched::Suppressed;
        };
        let args = build();
        self.invoke(&set, event, |set| deliver(set, args))
    }

    fn invoke<R, D>(&self, set: &CallbackSet, event: &'static str, deliver: D) -> Dispatched<R>
    where
        D: FnOnce(&CallbackSet) -> CallbackResult<R>,
    {
        let start = Instant::now();
        let result = deliver(set);
        let elapsed = start.elapsed();

        if elapsed > self.slow_threshold {
            self.stats.inc_slow_callbacks();
            warn!(
                event,
                duration_us = elapsed.as_micros() as u64,
                "slow observer callback"
            );
        }

        match result {
            Ok(value) => {
                self.stats.inc_delivered();
                trace!(event, "callback delivered");
                Dispatched::Delivered(value)
            }
            Err(e) => {
                self.stats.inc_callback_failures();
                warn!(event, status = %e.status, error = %e.message, "observer callback failed");
                Dispatched::Failed(e)
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(SLOW_CALLBACK_THRESHOLD)
    }
}
