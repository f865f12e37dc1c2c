/*!
 * Engine Event Entry Points
 *
 * Loader, JIT, exception and probe notifications raised by the engine.
 * Each one updates broker tables first and then dispatches; dispatch
 * failures never change what the engine does except through gate answers.
 */

use super::hooks::{HookFrame, HookKind};
use super::Broker;
use crate::callbacks::{CacheLookup, CallbackSet, CallbackVersion, EngineEvent, JitTarget};
use crate::code::{CodeRange, CompiledCodeRegion};
use crate::core::types::{
    BrokerResult, ClassId, FunctionId, IlToNativeEntry, ModuleId, ReJitId, StatusCode,
};
use crate::dispatch::Dispatched;
use crate::mask::{EventCategory, MonitorFlags};
use crate::objects::{Generation, ObjectId};
use crate::rejit::RejitFlags;
use std::sync::Arc;
use tracing::{debug, warn};

impl Broker {
    /// Deliver a notification that needs no broker bookkeeping
    pub fn raise(&self, event: EngineEvent) -> Dispatched<()> {
        let dispatcher = &self.inner.dispatcher;
        if !dispatcher.is_enabled(event.category()) {
            dispatcher.stats().inc_suppressed();
            return Dispatched::Suppressed;
        }
        let needs = event.min_version();
        if needs > CallbackVersion::V1
            && !dispatcher
                .observer()
                .is_some_and(|set| set.supports(needs))
        {
            dispatcher.stats().inc_suppressed();
            return Dispatched::Suppressed;
        }
        dispatcher.dispatch(event.category(), || event, |set, event| event.deliver(set))
    }

    // =========================================================================
    // Loader
    // =========================================================================

    /// Module load finished; precompiled modules without inlining records make
    /// inliner enumeration incomplete from here on
    pub fn module_load_finished(&self, module: ModuleId, status: StatusCode) -> Dispatched<()> {
        if status.is_success() {
            if let Some(metadata) = self.inner.services.metadata.as_deref() {
                match metadata.module_info(module) {
                    Ok(info) if info.flags.lacks_inline_tracking() => {
                        self.inner.rejit.inlining().mark_untracked(module);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(module = %module, error = %e, "module info unavailable"),
                }
            }
        }
        self.inner.dispatcher.dispatch(
            EventCategory::ModuleLoads,
            || (),
            |set, ()| set.v1().module_load_finished(module, status),
        )
    }

    pub fn module_unload_finished(&self, module: ModuleId, status: StatusCode) -> Dispatched<()> {
        if status.is_success() {
            self.inner.rejit.inlining().module_unloaded(module);
            self.inner.replaced_bodies.retain(|method, _| method.module != module);
        }
        self.inner.dispatcher.dispatch(
            EventCategory::ModuleLoads,
            || (),
            |set, ()| set.v1().module_unload_finished(module, status),
        )
    }

    /// A function's code is about to be discarded
    pub fn function_unload_started(&self, function: FunctionId) -> Dispatched<()> {
        let outcome = self.inner.dispatcher.dispatch(
            EventCategory::FunctionUnloads,
            || (),
            |set, ()| set.v1().function_unload_started(function),
        );
        self.forget_function(function);
        outcome
    }

    /// Dynamically emitted code was reclaimed
    pub fn dynamic_function_unloaded(&self, function: FunctionId) -> Dispatched<()> {
        self.forget_function(function);
        self.inner.dispatcher.dispatch(
            EventCategory::DynamicFunctionUnloads,
            || (),
            |set, ()| match set.v5() {
                Some(v5) => v5.dynamic_function_unloaded(function),
                None => Ok(()),
            },
        )
    }

    fn forget_function(&self, function: FunctionId) {
        let removed = self.inner.code.remove_function(function);
        self.inner.functions.remove(&function);
        self.inner.hooks.forget(function);
        if removed > 0 {
            debug!(function = %function, removed, "function code forgotten");
        }
    }

    // =========================================================================
    // JIT
    // =========================================================================

    /// Compilation of an original body is starting
    ///
    /// Returns the replacement body the observer supplied for this method,
    /// either earlier or from inside this very callback.
    pub fn jit_compilation_started(
        &self,
        target: JitTarget,
        safe_to_block: bool,
    ) -> Option<Arc<[u8]>> {
        self.inner.functions.insert(target.function, target.method);
        self.inner.dispatcher.dispatch(
            EventCategory::JitCompilation,
            || (),
            |set, ()| set.v1().jit_compilation_started(target.function, safe_to_block),
        );
        self.inner.jitted.insert(target.method);
        self.inner
            .replaced_bodies
            .remove(&target.method)
            .map(|(_, body)| body)
    }

    /// Compilation of an original body finished
    ///
    /// On success the code range becomes resolvable as the original revision.
    pub fn jit_compilation_finished(
        &self,
        target: JitTarget,
        code: CodeRange,
        status: StatusCode,
        safe_to_block: bool,
    ) -> BrokerResult<Dispatched<()>> {
        self.inner.jitted.insert(target.method);
        self.inner.functions.insert(target.function, target.method);
        if status.is_success() {
            self.inner.code.insert(CompiledCodeRegion::new(
                target.function,
                ReJitId::ORIGINAL,
                code,
            ))?;
        }
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::JitCompilation,
            || (),
            |set, ()| set.v1().jit_compilation_finished(target.function, status, safe_to_block),
        ))
    }

    /// Record the IL-to-native map the compiler produced for one revision
    pub fn set_il_to_native_map(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        entries: &[IlToNativeEntry],
    ) {
        self.inner.code.set_il_to_native_map(function, rejit, entries);
    }

    /// Gate: may the engine use precompiled code for this function?
    pub fn jit_cached_function_search_started(&self, target: JitTarget) -> bool {
        self.inner.functions.insert(target.function, target.method);
        let dispatcher = &self.inner.dispatcher;
        let outcome = dispatcher.dispatch(
            EventCategory::CacheSearches,
            || (),
            |set, ()| set.v1().jit_cached_function_search_started(target.function),
        );
        dispatcher.resolve_gate(outcome, true, false)
    }

    pub fn jit_cached_function_search_finished(
        &self,
        target: JitTarget,
        result: CacheLookup,
        code: Option<CodeRange>,
    ) -> BrokerResult<Dispatched<()>> {
        if let (CacheLookup::Found, Some(code)) = (result, code) {
            self.inner.jitted.insert(target.method);
            self.inner.code.insert(CompiledCodeRegion::new(
                target.function,
                ReJitId::ORIGINAL,
                code,
            ))?;
        }
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::CacheSearches,
            || (),
            |set, ()| set.v1().jit_cached_function_search_finished(target.function, result),
        ))
    }

    /// Gate: may the engine inline `callee` into `caller`?
    ///
    /// Live recompilation requests on the callee can block inlining outright
    /// or force the question to the observer even when JIT events are
    /// disabled. Decisions to inline are recorded for inliner enumeration.
    pub fn jit_inlining(&self, caller: JitTarget, callee: JitTarget) -> bool {
        let inner = &self.inner;
        let flags = inner.rejit.live_flags(callee.method);
        let mask = inner.dispatcher.mask().get();

        let inline = if flags.contains(RejitFlags::BLOCK_INLINING)
            || mask.low.contains(MonitorFlags::DISABLE_INLINING)
        {
            false
        } else {
            let deliver = |set: &CallbackSet, ()| set.v1().jit_inlining(caller.function, callee.function);
            let outcome = if flags.contains(RejitFlags::INLINING_CALLBACKS) {
                inner.dispatcher.dispatch_mandatory("jit_inlining", || (), deliver)
            } else {
                inner
                    .dispatcher
                    .dispatch(EventCategory::JitCompilation, || (), deliver)
            };
            inner.dispatcher.resolve_gate(outcome, true, false)
        };

        if inline {
            inner.rejit.inlining().record(caller.method, callee.method);
        }
        inline
    }

    // =========================================================================
    // Exceptions
    // =========================================================================

    pub fn exception_thrown(&self, exception: ObjectId) -> Dispatched<()> {
        let objects = &self.inner.objects;
        self.inner.dispatcher.dispatch(
            EventCategory::Exceptions,
            || objects.current_ref(exception),
            |set, object| set.v1().exception_thrown(object),
        )
    }

    pub fn exception_catcher_enter(&self, function: FunctionId, exception: ObjectId) -> Dispatched<()> {
        let objects = &self.inner.objects;
        self.inner.dispatcher.dispatch(
            EventCategory::Exceptions,
            || objects.current_ref(exception),
            |set, object| set.v1().exception_catcher_enter(function, object),
        )
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Register a new object and report it
    ///
    /// Large and pinned allocations are reported when their own category or
    /// the general allocation category is enabled.
    pub fn object_allocated(
        &self,
        object: ObjectId,
        class: ClassId,
        size: usize,
        generation: Generation,
    ) -> BrokerResult<Dispatched<()>> {
        let reference = self.inner.objects.register(object, class, size, generation)?;
        let category = match generation {
            Generation::LargeObjectHeap
                if self.inner.dispatcher.is_enabled(EventCategory::LargeObjectAllocated) =>
            {
                EventCategory::LargeObjectAllocated
            }
            Generation::PinnedObjectHeap
                if self.inner.dispatcher.is_enabled(EventCategory::PinnedObjectAllocated) =>
            {
                EventCategory::PinnedObjectAllocated
            }
            _ => EventCategory::ObjectAllocated,
        };
        Ok(self.inner.dispatcher.dispatch(
            category,
            || reference,
            |set, reference| set.v1().object_allocated(reference, class),
        ))
    }

    // =========================================================================
    // Enter/leave probes
    // =========================================================================

    /// Gate: should the engine insert probes into `function`?
    ///
    /// Asks the observer's function-id mapper once per function; a failed
    /// mapper means no probes.
    pub fn map_function(&self, function: FunctionId) -> bool {
        let inner = &self.inner;
        if !inner.dispatcher.is_enabled(EventCategory::EnterLeave) || !inner.hooks.is_installed() {
            return false;
        }
        match inner.hooks.map_function(function) {
            Ok(mapped) => mapped.is_some(),
            Err(e) => {
                inner.dispatcher.stats().inc_gate_defaults();
                warn!(function = %function, error = %e.message, "function id mapper failed");
                false
            }
        }
    }

    pub fn function_enter(&self, function: FunctionId, frame_token: u64, arguments: &[u8]) -> bool {
        let args = self
            .event_mask()
            .low
            .contains(MonitorFlags::ENABLE_FUNCTION_ARGS)
            .then_some(arguments);
        self.fire_hook(HookKind::Enter, function, frame_token, args, None)
    }

    pub fn function_leave(&self, function: FunctionId, frame_token: u64, return_value: &[u8]) -> bool {
        let retval = self
            .event_mask()
            .low
            .contains(MonitorFlags::ENABLE_FUNCTION_RETVAL)
            .then_some(return_value);
        self.fire_hook(HookKind::Leave, function, frame_token, None, retval)
    }

    pub fn function_tailcall(&self, function: FunctionId, frame_token: u64) -> bool {
        self.fire_hook(HookKind::Tailcall, function, frame_token, None, None)
    }

    fn fire_hook(
        &self,
        kind: HookKind,
        function: FunctionId,
        frame_token: u64,
        arguments: Option<&[u8]>,
        return_value: Option<&[u8]>,
    ) -> bool {
        if !self.inner.dispatcher.is_enabled(EventCategory::EnterLeave) {
            return false;
        }
        self.inner.hooks.fire(
            kind,
            &HookFrame {
                function,
                frame_token,
                arguments,
                return_value,
            },
        )
    }
}
