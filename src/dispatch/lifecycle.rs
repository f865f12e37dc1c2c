/*!
 * Observer Lifecycle
 *
 * Process-wide single-observer slot plus the per-broker attach state:
 * Detached -> Initializing -> Attached -> Detaching -> Detached.
 */

use crate::core::errors::BrokerError;
use crate::core::id::SessionId;
use crate::core::limits::MAX_DETACH_COMPLETION_HINT;
use crate::core::types::BrokerResult;
use crate::mask::AttachMode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One observer per process, across every broker instance
static OBSERVER_SLOT: AtomicBool = AtomicBool::new(false);

/// Ownership of the process observer slot, released on drop
#[derive(Debug)]
pub struct SlotClaim {
    _private: (),
}

impl SlotClaim {
    pub fn acquire() -> BrokerResult<Self> {
        OBSERVER_SLOT
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SlotClaim { _private: () })
            .map_err(|_| BrokerError::AlreadyAttached)
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        OBSERVER_SLOT.store(false, Ordering::Release);
    }
}

/// Whether some broker in this process has an observer
pub fn slot_occupied() -> bool {
    OBSERVER_SLOT.load(Ordering::Acquire)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Detached = 0,
    /// Initialize callback running; immutable mask bits still writable
    Initializing = 1,
    Attached = 2,
    /// Detach requested, waiting for in-flight work to drain
    Detaching = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Attached,
            3 => LifecycleState::Detaching,
            _ => LifecycleState::Detached,
        }
    }
}

struct Session {
    id: SessionId,
    mode: AttachMode,
    attached_at: Instant,
    detach_requested: Option<(Instant, Duration)>,
    _claim: SlotClaim,
}

pub struct Lifecycle {
    state: AtomicU8,
    session: Mutex<Option<Session>>,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Detached as u8),
            session: Mutex::new(None),
        }
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.lock().as_ref().map(|s| s.id)
    }

    pub fn attach_mode(&self) -> Option<AttachMode> {
        self.session.lock().as_ref().map(|s| s.mode)
    }

    /// True while `session` is the live session and the observer may call in
    pub fn is_current(&self, session: SessionId) -> bool {
        self.session_id() == Some(session) && self.state() != LifecycleState::Detached
    }

    /// Start a session: claims the process slot and enters `Initializing`
    pub(crate) fn begin(&self, mode: AttachMode) -> BrokerResult<SessionId> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(BrokerError::AlreadyAttached);
        }
        let claim = SlotClaim::acquire()?;
        let id = SessionId::generate();
        *session = Some(Session {
            id,
            mode,
            attached_at: Instant::now(),
            detach_requested: None,
            _claim: claim,
        });
        self.state
            .store(LifecycleState::Initializing as u8, Ordering::Release);
        info!(session = %id, ?mode, "observer session started");
        Ok(id)
    }

    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> BrokerResult<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| {
                BrokerError::invalid_state(format!(
                    "observer is {:?}, expected {:?}",
                    LifecycleState::from_u8(actual),
                    from
                ))
            })
    }

    /// `Attached -> Detaching`, remembering the observer's completion hint
    pub(crate) fn request_detach(&self, expected_completion: Duration) -> BrokerResult<()> {
        let hint = expected_completion.min(MAX_DETACH_COMPLETION_HINT);
        self.transition(LifecycleState::Attached, LifecycleState::Detaching)?;
        if let Some(session) = self.session.lock().as_mut() {
            session.detach_requested = Some((Instant::now(), hint));
        }
        Ok(())
    }

    /// Time left before the observer's own completion hint runs out
    pub fn detach_hint_remaining(&self) -> Option<Duration> {
        self.session
            .lock()
            .as_ref()
            .and_then(|s| s.detach_requested)
            .map(|(at, hint)| hint.saturating_sub(at.elapsed()))
    }

    /// End the session and release the process slot
    pub(crate) fn end(&self) {
        let ended = self.session.lock().take();
        self.state
            .store(LifecycleState::Detached as u8, Ordering::Release);
        if let Some(session) = ended {
            if let Some((at, hint)) = session.detach_requested {
                if at.elapsed() > hint {
                    warn!(
                        session = %session.id,
                        hint_ms = hint.as_millis() as u64,
                        "detach completed after the observer's expected completion time"
                    );
                }
            }
            info!(
                session = %session.id,
                duration_ms = session.attached_at.elapsed().as_millis() as u64,
                "observer session ended"
            );
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
