/*!
 * Stack Snapshot Walker
 *
 * Synchronous innermost-out walk of one thread. Walking another thread is
 * only done while the engine holds it suspended; the walker asks for the
 * suspension and always resumes, including when the callback panics.
 */

use super::types::{FrameFunction, FrameInfo, WalkControl, WalkFlags, WalkOutcome};
use crate::code::CodeRegionTable;
use crate::core::errors::BrokerError;
use crate::core::guards::{CounterGuard, OnDrop};
use crate::core::limits::DEFAULT_MAX_WALK_DEPTH;
use crate::core::types::{BrokerResult, ThreadId};
use crate::services::ThreadControl;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

pub struct StackWalker {
    active: AtomicUsize,
    max_depth: usize,
}

impl StackWalker {
    pub fn new(max_depth: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max_depth: max_depth.max(1),
        }
    }

    /// Walks currently running
    #[inline]
    pub fn active_walks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Walk `thread` (the calling thread when `None`)
    ///
    /// Stopping early is a success. Failing to capture the thread's stack
    /// fails the whole walk before any frame is delivered.
    pub fn walk<F>(
        &self,
        threads: &dyn ThreadControl,
        code: &CodeRegionTable,
        thread: Option<ThreadId>,
        flags: WalkFlags,
        seed_context: Option<&[u8]>,
        mut callback: F,
    ) -> BrokerResult<WalkOutcome>
    where
        F: FnMut(&FrameInfo<'_>) -> WalkControl,
    {
        if !threads.supports_stack_walks() {
            return Err(BrokerError::not_available(
                "stack walks are not supported by this engine",
            ));
        }

        let current = threads.current_thread();
        let target = thread.or(current).ok_or_else(|| {
            BrokerError::invalid_argument("no target thread and the caller is not a managed thread")
        })?;

        let _active = CounterGuard::enter(&self.active, "stack_walk");

        let cross_thread = current != Some(target);
        let resume = if cross_thread {
            threads.suspend(target)?;
            Some(OnDrop::new("thread_suspension", move || {
                if let Err(e) = threads.resume(target) {
                    warn!(thread = %target, error = %e, "failed to resume thread after walk");
                }
            }))
        } else {
            None
        };

        let with_context = flags.contains(WalkFlags::REGISTER_CONTEXT);
        let frames = threads.capture_stack(target, seed_context, with_context)?;

        let mut outcome = WalkOutcome::default();
        for (index, raw) in frames.iter().enumerate() {
            if index >= self.max_depth {
                outcome.truncated = true;
                break;
            }

            let function = match code.lookup(raw.ip) {
                Some(region) => FrameFunction::Managed {
                    function: region.function,
                    rejit: region.rejit,
                },
                None => FrameFunction::Unmanaged,
            };
            let frame = FrameInfo {
                index,
                thread: target,
                ip: raw.ip,
                function,
                frame_token: raw.frame_token,
                context: with_context.then_some(raw.context.as_slice()),
            };

            outcome.frames += 1;
            if callback(&frame) == WalkControl::Stop {
                outcome.stopped_early = true;
                break;
            }
        }

        drop(resume);
        debug!(
            thread = %target,
            cross_thread,
            frames = outcome.frames,
            stopped_early = outcome.stopped_early,
            truncated = outcome.truncated,
            "stack walk complete"
        );
        Ok(outcome)
    }
}

impl Default for StackWalker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WALK_DEPTH)
    }
}
