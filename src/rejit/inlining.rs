/*!
 * Inlining Tracker
 * Records which methods inlined which, for recompiling stale inlined copies
 */

use super::types::InlinerEnumeration;
use crate::core::types::{MethodKey, ModuleId};
use ahash::{HashSet, HashSetExt, RandomState};
use dashmap::{DashMap, DashSet};
use tracing::debug;

/// Callee to callers map built from inlining decisions
pub struct InlineTracker {
    inliners: DashMap<MethodKey, HashSet<MethodKey>, RandomState>,
    /// Loaded precompiled modules that carry no inlining data
    untracked: DashSet<ModuleId, RandomState>,
}

impl InlineTracker {
    pub fn new() -> Self {
        Self {
            inliners: DashMap::with_hasher(RandomState::new()),
            untracked: DashSet::with_hasher(RandomState::new()),
        }
    }

    /// `caller` now contains an inlined copy of `callee`
    pub fn record(&self, caller: MethodKey, callee: MethodKey) {
        if caller == callee {
            return;
        }
        let inserted = self
            .inliners
            .entry(callee)
            .or_insert_with(HashSet::new)
            .insert(caller);
        if inserted {
            debug!(caller = %caller, callee = %callee, "inlining recorded");
        }
    }

    /// Every method known to have inlined `callee`
    pub fn enumerate(&self, callee: MethodKey) -> InlinerEnumeration {
        let mut methods: Vec<MethodKey> = self
            .inliners
            .get(&callee)
            .map(|callers| callers.iter().copied().collect())
            .unwrap_or_default();
        methods.sort_unstable();
        InlinerEnumeration {
            methods,
            incomplete: !self.untracked.is_empty(),
        }
    }

    /// A precompiled module without inlining data was loaded
    pub fn mark_untracked(&self, module: ModuleId) {
        self.untracked.insert(module);
    }

    /// Forget everything recorded for code in `module`
    pub fn module_unloaded(&self, module: ModuleId) {
        self.untracked.remove(&module);
        self.inliners.retain(|callee, callers| {
            callers.retain(|caller| caller.module != module);
            callee.module != module && !callers.is_empty()
        });
    }

    pub(crate) fn clear(&self) {
        self.inliners.clear();
        self.untracked.clear();
    }
}

impl Default for InlineTracker {
    fn default() -> Self {
        Self::new()
    }
}
