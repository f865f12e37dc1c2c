/*!
 * Recompilation Types
 * Revision states, request flags and supplied parameters
 */

use crate::core::types::{FunctionId, IlMapEntry, MethodKey, ReJitId, StatusCode};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

bitflags! {
    /// Options attached to a recompilation request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RejitFlags: u32 {
        /// The recompiled method must not be inlined into its callers
        const BLOCK_INLINING = 0x1;
        /// Route inlining decisions for this method to the observer
        const INLINING_CALLBACKS = 0x2;
    }
}

bitflags! {
    /// Code generation flags for one revision
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CodegenFlags: u32 {
        const DISABLE_INLINING = 0x1;
        const DISABLE_OPTIMIZATIONS = 0x2;
    }
}

impl Default for RejitFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for CodegenFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Lifecycle state of one revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum RejitState {
    Requested,
    ParametersPending,
    ParametersSupplied,
    CompilationStarted,
    CompilationFinished(StatusCode),
    Active,
    Reverted,
    Errored(StatusCode),
}

impl RejitState {
    /// Position on the forward path; terminal states sort last
    pub const fn rank(self) -> u8 {
        match self {
            RejitState::Requested => 0,
            RejitState::ParametersPending => 1,
            RejitState::ParametersSupplied => 2,
            RejitState::CompilationStarted => 3,
            RejitState::CompilationFinished(_) => 4,
            RejitState::Active => 5,
            RejitState::Reverted | RejitState::Errored(_) => 6,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, RejitState::Reverted | RejitState::Errored(_))
    }

    /// Parameters have been supplied and the revision is not terminal
    pub const fn is_compilable(self) -> bool {
        matches!(self, RejitState::ParametersSupplied | RejitState::Active)
    }

    /// Forward-only transition rule
    pub fn can_transition_to(self, next: RejitState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RejitState::Reverted | RejitState::Errored(_) => true,
            RejitState::Active => {
                matches!(self, RejitState::CompilationFinished(status) if status.is_success())
            }
            _ => next.rank() == self.rank() + 1,
        }
    }
}

/// Everything the observer supplied for one revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejitParameters {
    pub codegen: CodegenFlags,
    pub il_body: Option<Arc<[u8]>>,
    pub il_map: Vec<IlMapEntry>,
}

/// Snapshot of one revision for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub rejit: ReJitId,
    pub method: MethodKey,
    pub flags: RejitFlags,
    pub state: RejitState,
    /// Every state entered, oldest first (empty when history is disabled)
    pub history: Vec<RejitState>,
    /// Instantiations compiled under this revision
    pub functions: Vec<FunctionId>,
}

/// Methods that inlined a given method
///
/// `incomplete` is set when inlining data is missing for some loaded code,
/// in which case `methods` is a valid but possibly partial answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlinerEnumeration {
    pub methods: Vec<MethodKey>,
    pub incomplete: bool,
}
