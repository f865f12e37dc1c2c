/*!
 * Stack Walk Types
 */

use crate::core::types::{Address, FunctionId, ReJitId, ThreadId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct WalkFlags: u32 {
        /// Hand each frame's raw register context to the callback
        const REGISTER_CONTEXT = 0x1;
    }
}

impl Default for WalkFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Per-frame answer from the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

/// Code a frame is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameFunction {
    Managed { function: FunctionId, rejit: ReJitId },
    Unmanaged,
}

impl FrameFunction {
    pub fn function(&self) -> Option<FunctionId> {
        match self {
            FrameFunction::Managed { function, .. } => Some(*function),
            FrameFunction::Unmanaged => None,
        }
    }
}

/// One frame, borrowed for the duration of a single callback
///
/// Nothing in here outlives the callback invocation; copy out whatever is
/// needed before returning.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo<'walk> {
    /// Zero for the innermost frame
    pub index: usize,
    pub thread: ThreadId,
    pub ip: Address,
    pub function: FrameFunction,
    /// Engine frame metadata handle, only meaningful inside the callback
    pub frame_token: u64,
    /// Present only with `WalkFlags::REGISTER_CONTEXT`
    pub context: Option<&'walk [u8]>,
}

/// How a successful walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalkOutcome {
    /// Frames handed to the callback
    pub frames: usize,
    /// The callback asked to stop
    pub stopped_early: bool,
    /// The depth limit cut the walk short
    pub truncated: bool,
}
