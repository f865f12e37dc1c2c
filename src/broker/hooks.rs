/*!
 * Enter/Leave Hooks
 *
 * Function entry, exit and tail-call probes installed by the observer
 * during initialization, plus the function-id mapper deciding which
 * functions get probed.
 */

use crate::core::errors::CallbackResult;
use crate::core::types::FunctionId;
use ahash::RandomState;
use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which probe fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Enter,
    Leave,
    Tailcall,
}

/// Frame data handed to detailed and combined probes
///
/// Borrowed for one probe invocation only.
#[derive(Debug, Clone, Copy)]
pub struct HookFrame<'a> {
    pub function: FunctionId,
    pub frame_token: u64,
    /// Present when `ENABLE_FUNCTION_ARGS` is set, on enter only
    pub arguments: Option<&'a [u8]>,
    /// Present when `ENABLE_FUNCTION_RETVAL` is set, on leave only
    pub return_value: Option<&'a [u8]>,
}

/// Probe receiving the observer's client id for the function
pub type BasicHook = Arc<dyn Fn(u64) + Send + Sync>;
pub type DetailedHook = Arc<dyn Fn(u64, &HookFrame<'_>) + Send + Sync>;
pub type CombinedHook = Arc<dyn Fn(HookKind, u64, &HookFrame<'_>) + Send + Sync>;

/// Observer decision for one function: probe it, and under which client id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMapping {
    pub client_id: u64,
    pub hook: bool,
}

pub type FunctionIdMapper = Arc<dyn Fn(FunctionId) -> CallbackResult<FunctionMapping> + Send + Sync>;

/// Installed probe shape
#[derive(Clone)]
pub enum EnterLeaveHooks {
    /// Client id only
    Basic {
        enter: BasicHook,
        leave: BasicHook,
        tailcall: BasicHook,
    },
    /// Client id plus frame data
    Detailed {
        enter: DetailedHook,
        leave: DetailedHook,
        tailcall: DetailedHook,
    },
    /// One probe for all three events
    Combined(CombinedHook),
}

impl EnterLeaveHooks {
    fn invoke(&self, kind: HookKind, client_id: u64, frame: &HookFrame<'_>) {
        match self {
            EnterLeaveHooks::Basic { enter, leave, tailcall } => match kind {
                HookKind::Enter => enter(client_id),
                HookKind::Leave => leave(client_id),
                HookKind::Tailcall => tailcall(client_id),
            },
            EnterLeaveHooks::Detailed { enter, leave, tailcall } => match kind {
                HookKind::Enter => enter(client_id, frame),
                HookKind::Leave => leave(client_id, frame),
                HookKind::Tailcall => tailcall(client_id, frame),
            },
            EnterLeaveHooks::Combined(hook) => hook(kind, client_id, frame),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            EnterLeaveHooks::Basic { .. } => "basic",
            EnterLeaveHooks::Detailed { .. } => "detailed",
            EnterLeaveHooks::Combined(_) => "combined",
        }
    }
}

impl fmt::Debug for EnterLeaveHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnterLeaveHooks::{}", self.shape())
    }
}

/// Installed probes and the per-function mapping cache
pub(crate) struct HookTable {
    hooks: ArcSwapOption<EnterLeaveHooks>,
    mapper: ArcSwapOption<FunctionIdMapper>,
    /// `None` means the function is not probed
    mappings: DashMap<FunctionId, Option<u64>, RandomState>,
}

impl HookTable {
    pub(crate) fn new() -> Self {
        Self {
            hooks: ArcSwapOption::empty(),
            mapper: ArcSwapOption::empty(),
            mappings: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub(crate) fn install(&self, hooks: EnterLeaveHooks) {
        debug!(shape = hooks.shape(), "enter/leave hooks installed");
        self.hooks.store(Some(Arc::new(hooks)));
    }

    pub(crate) fn set_mapper(&self, mapper: FunctionIdMapper) {
        self.mapper.store(Some(Arc::new(mapper)));
        self.mappings.clear();
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.hooks.load().is_some()
    }

    /// Client id for `function`, asking the mapper once per function
    ///
    /// Returns `Ok(None)` when the function should not be probed and
    /// `Err` when the mapper failed (also not probed).
    pub(crate) fn map_function(&self, function: FunctionId) -> CallbackResult<Option<u64>> {
        if let Some(cached) = self.mappings.get(&function) {
            return Ok(*cached);
        }
        let decision = match self.mapper.load_full() {
            Some(mapper) => {
                let mapping = (**mapper)(function)?;
                mapping.hook.then_some(mapping.client_id)
            }
            None => Some(function.0),
        };
        self.mappings.insert(function, decision);
        Ok(decision)
    }

    pub(crate) fn mapped(&self, function: FunctionId) -> Option<u64> {
        self.mappings.get(&function).and_then(|entry| *entry)
    }

    pub(crate) fn forget(&self, function: FunctionId) {
        self.mappings.remove(&function);
    }

    /// Fire a probe; returns whether one ran
    pub(crate) fn fire(&self, kind: HookKind, frame: &HookFrame<'_>) -> bool {
        let Some(client_id) = self.mapped(frame.function) else {
            return false;
        };
        match &*self.hooks.load() {
            Some(hooks) => {
                hooks.invoke(kind, client_id, frame);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) {
        self.hooks.store(None);
        self.mapper.store(None);
        self.mappings.clear();
    }
}
