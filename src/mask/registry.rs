/*!
 * Event Mask Registry
 *
 * Holds the attached observer's enabled-event bitset. Every engine event
 * site consults it through `is_enabled`, a single atomic load and AND.
 */

use super::category::{EventCategory, MutationKind};
use super::flags::{EventMask, MonitorFlags};
use crate::core::errors::BrokerError;
use crate::core::types::BrokerResult;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use tracing::{debug, info};

/// How the observer was loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttachMode {
    /// Loaded as the engine started
    Startup = 0,
    /// Attached to an already running process
    Running = 1,
}

/// What the observer is allowed to subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObserverKind {
    /// Full observer: may instrument and rewrite code
    Primary = 0,
    /// Receives notifications only
    NotificationOnly = 1,
}

/// Enabled-event bitset for the attached observer
///
/// # Performance
/// - Cache-line aligned: the mask word is read on every event site
/// - Reads never lock; writers validate then publish with a CAS loop
#[repr(C, align(64))]
pub struct EventMaskRegistry {
    bits: AtomicU64,
    /// Set once the initialize callback has returned
    locked: AtomicBool,
    mode: AtomicU8,
    kind: AtomicU8,
}

impl EventMaskRegistry {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU64::new(0),
            locked: AtomicBool::new(false),
            mode: AtomicU8::new(AttachMode::Startup as u8),
            kind: AtomicU8::new(ObserverKind::Primary as u8),
        }
    }

    /// Hot-path gate: is any bit of this category enabled?
    #[inline(always)]
    pub fn is_enabled(&self, category: EventCategory) -> bool {
        self.bits.load(Ordering::Acquire) & category.gate_bits() != 0
    }

    /// Test arbitrary bits (any of)
    #[inline]
    pub fn any(&self, mask: EventMask) -> bool {
        self.bits.load(Ordering::Acquire) & mask.to_bits() != 0
    }

    /// Test arbitrary bits (all of)
    #[inline]
    pub fn all(&self, mask: EventMask) -> bool {
        let bits = mask.to_bits();
        self.bits.load(Ordering::Acquire) & bits == bits
    }

    /// Current mask
    pub fn get(&self) -> EventMask {
        EventMask::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn attach_mode(&self) -> AttachMode {
        match self.mode.load(Ordering::Acquire) {
            1 => AttachMode::Running,
            _ => AttachMode::Startup,
        }
    }

    pub fn observer_kind(&self) -> ObserverKind {
        match self.kind.load(Ordering::Acquire) {
            1 => ObserverKind::NotificationOnly,
            _ => ObserverKind::Primary,
        }
    }

    /// Has the initialize callback returned?
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Replace the mask after validating ordering rules
    pub fn set(&self, requested: EventMask) -> BrokerResult<()> {
        self.validate_request(requested)?;

        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            if self.is_locked() {
                let changed = EventMask::from_bits(current).changed(requested);
                if changed.intersects(EventMask::IMMUTABLE) {
                    return Err(BrokerError::ImmutableFlags(format!(
                        "attempted to change {}",
                        changed.intersection(EventMask::IMMUTABLE)
                    )));
                }
            }

            match self.bits.compare_exchange_weak(
                current,
                requested.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        debug!(
            previous = %EventMask::from_bits(current),
            mask = %requested,
            locked = self.is_locked(),
            "event mask updated"
        );
        Ok(())
    }

    /// Is this mutation permitted by the current mask?
    pub fn check_mutation(&self, kind: MutationKind) -> BrokerResult<()> {
        if self.observer_kind() == ObserverKind::NotificationOnly {
            return Err(BrokerError::not_available(format!(
                "{:?} is not available to notification-only observers",
                kind
            )));
        }
        if self.any(kind.required()) {
            Ok(())
        } else {
            Err(BrokerError::invalid_state(format!(
                "{:?} requires one of {} in the event mask",
                kind,
                kind.required()
            )))
        }
    }

    fn validate_request(&self, requested: EventMask) -> BrokerResult<()> {
        if self.attach_mode() == AttachMode::Running {
            let disallowed = requested.difference(EventMask::ALLOWABLE_AFTER_ATTACH);
            if !disallowed.is_empty() {
                return Err(BrokerError::UnsupportedForAttach(format!(
                    "{} cannot be enabled by an observer attached to a running process",
                    disallowed
                )));
            }
        }

        if self.observer_kind() == ObserverKind::NotificationOnly {
            let disallowed = requested.difference(EventMask::ALLOWABLE_NOTIFICATION_PROFILER);
            if !disallowed.is_empty() {
                return Err(BrokerError::invalid_argument(format!(
                    "{} cannot be enabled by a notification-only observer",
                    disallowed
                )));
            }
        }

        if requested.low.contains(MonitorFlags::OBJECT_ALLOCATED)
            && !requested.low.contains(MonitorFlags::ENABLE_OBJECT_ALLOCATED)
        {
            return Err(BrokerError::invalid_argument(
                "OBJECT_ALLOCATED requires ENABLE_OBJECT_ALLOCATED",
            ));
        }

        Ok(())
    }

    /// Prepare for a new observer
    pub(crate) fn reset(&self, mode: AttachMode, kind: ObserverKind) {
        self.bits.store(0, Ordering::Release);
        self.mode.store(mode as u8, Ordering::Release);
        self.kind.store(kind as u8, Ordering::Release);
        self.locked.store(false, Ordering::Release);
    }

    /// Freeze immutable bits; called when the initialize callback returns
    pub(crate) fn lock_immutable(&self) {
        self.locked.store(true, Ordering::Release);
        info!(mask = %self.get(), "event mask locked after initialization");
    }

    /// Disable every category (detach, teardown)
    pub(crate) fn clear(&self) {
        self.bits.store(0, Ordering::Release);
    }
}

impl Default for EventMaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
