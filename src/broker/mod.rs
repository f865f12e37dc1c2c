/*!
 * Broker
 *
 * Owns every engine-side table and routes engine events to the attached
 * observer. The engine drives it through the methods on [`Broker`]; the
 * observer reaches it through the [`ProfilerInfo`] handle it receives at
 * initialization.
 */

mod attach;
mod builder;
mod events;
mod gc;
pub mod hooks;
mod info;
mod rejit;

pub use builder::BrokerBuilder;
pub use hooks::{
    BasicHook, CombinedHook, DetailedHook, EnterLeaveHooks, FunctionIdMapper, FunctionMapping,
    HookFrame, HookKind,
};
pub use info::{ProfilerInfo, RejitWithInliners};

use crate::code::CodeRegionTable;
use crate::core::config::BrokerConfig;
use crate::core::errors::BrokerError;
use crate::core::id::SessionId;
use crate::core::types::{BrokerResult, FunctionId, MethodKey};
use crate::dispatch::{Dispatcher, Lifecycle, LifecycleState};
use crate::mask::{EventCategory, EventMask};
use crate::monitoring::DispatchStats;
use crate::objects::ObjectTracker;
use crate::rejit::RejitManager;
use crate::services::{EngineControl, EnvironmentAccess, MetadataProvider, ThreadControl};
use crate::stackwalk::StackWalker;
use ahash::RandomState;
use dashmap::{DashMap, DashSet};
use hooks::HookTable;
use std::sync::Arc;

/// Engine collaborators; absent ones surface as `NotAvailable`
pub(crate) struct Services {
    pub(crate) metadata: Option<Arc<dyn MetadataProvider>>,
    pub(crate) threads: Option<Arc<dyn ThreadControl>>,
    pub(crate) control: Option<Arc<dyn EngineControl>>,
    pub(crate) environment: Arc<dyn EnvironmentAccess>,
}

impl Services {
    pub(crate) fn metadata(&self) -> BrokerResult<&dyn MetadataProvider> {
        self.metadata
            .as_deref()
            .ok_or_else(|| BrokerError::not_available("no metadata provider registered"))
    }

    pub(crate) fn threads(&self) -> BrokerResult<&dyn ThreadControl> {
        self.threads
            .as_deref()
            .ok_or_else(|| BrokerError::not_available("no thread control registered"))
    }

    pub(crate) fn control(&self) -> BrokerResult<&dyn EngineControl> {
        self.control
            .as_deref()
            .ok_or_else(|| BrokerError::not_available("no engine control registered"))
    }
}

pub(crate) struct BrokerInner {
    pub(crate) config: BrokerConfig,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) objects: ObjectTracker,
    pub(crate) code: CodeRegionTable,
    pub(crate) rejit: RejitManager,
    pub(crate) walker: StackWalker,
    pub(crate) services: Services,
    pub(crate) hooks: HookTable,
    /// Bodies supplied through `set_il_function_body`, consumed at first compilation
    pub(crate) replaced_bodies: DashMap<MethodKey, Arc<[u8]>, RandomState>,
    /// Methods that have been compiled at least once
    pub(crate) jitted: DashSet<MethodKey, RandomState>,
    pub(crate) functions: DashMap<FunctionId, MethodKey, RandomState>,
}

impl BrokerInner {
    /// Drop per-session state
    pub(crate) fn reset_tables(&self) {
        self.dispatcher.mask().clear();
        self.hooks.clear();
        self.rejit.clear();
        self.objects.reset();
        self.code.clear();
        self.replaced_bodies.clear();
        self.jitted.clear();
        self.functions.clear();
    }
}

/// Engine-side handle to the broker
///
/// Dropping it delivers `shutdown` to an attached observer and releases the
/// process observer slot.
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.lifecycle.session_id()
    }

    pub fn is_attached(&self) -> bool {
        matches!(
            self.lifecycle_state(),
            LifecycleState::Initializing | LifecycleState::Attached
        )
    }

    pub fn event_mask(&self) -> EventMask {
        self.inner.dispatcher.mask().get()
    }

    /// Pre-test for engine call sites that want to skip their own work
    #[inline(always)]
    pub fn is_enabled(&self, category: EventCategory) -> bool {
        self.inner.dispatcher.is_enabled(category)
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.dispatcher.stats().snapshot()
    }

    /// Callbacks currently running on any thread
    pub fn callbacks_in_flight(&self) -> usize {
        self.inner.dispatcher.in_flight()
    }

    pub fn objects(&self) -> &ObjectTracker {
        &self.inner.objects
    }

    pub fn code(&self) -> &CodeRegionTable {
        &self.inner.code
    }

    pub fn rejit(&self) -> &RejitManager {
        &self.inner.rejit
    }
}

impl Default for Broker {
    fn default() -> Self {
        BrokerBuilder::new().build()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if self.lifecycle_state() != LifecycleState::Detached {
            self.shutdown();
        }
    }
}
