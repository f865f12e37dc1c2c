/*!
 * Observer Callback Traits
 *
 * Each interface version extends the previous one. Observers implement the
 * versions they need and advertise them through the `as_vN` queries, most
 * conveniently with [`impl_callback_versions!`](crate::impl_callback_versions).
 * Every callback defaults to a successful no-op.
 */

use super::types::{CacheLookup, TransitionReason};
use crate::broker::ProfilerInfo;
use crate::core::errors::CallbackResult;
use crate::core::types::{
    AppDomainId, AssemblyId, ClassId, FunctionId, GcHandleId, MdToken, ModuleId, ReJitId,
    StatusCode, ThreadId,
};
use crate::objects::{
    FinalizerFlags, GcReason, GenerationSet, ManagedObjectRef, MovedRangeBatch,
    NarrowMovedRangeBatch, NarrowSurvivedRangeBatch, ObjectId, RootReference, SuspendReason,
    SurvivedRangeBatch,
};
use crate::rejit::FunctionControl;

/// Base observer interface
#[allow(unused_variables)]
pub trait ProfilerCallback: Send + Sync {
    /// Cold-start initialization; the only point where immutable mask bits may be set
    fn initialize(&self, info: ProfilerInfo) -> CallbackResult {
        Ok(())
    }

    fn shutdown(&self) -> CallbackResult {
        Ok(())
    }

    // Loader

    fn app_domain_creation_started(&self, domain: AppDomainId) -> CallbackResult {
        Ok(())
    }

    fn app_domain_creation_finished(&self, domain: AppDomainId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn app_domain_shutdown_started(&self, domain: AppDomainId) -> CallbackResult {
        Ok(())
    }

    fn app_domain_shutdown_finished(&self, domain: AppDomainId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn assembly_load_started(&self, assembly: AssemblyId) -> CallbackResult {
        Ok(())
    }

    fn assembly_load_finished(&self, assembly: AssemblyId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn assembly_unload_started(&self, assembly: AssemblyId) -> CallbackResult {
        Ok(())
    }

    fn assembly_unload_finished(&self, assembly: AssemblyId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn module_load_started(&self, module: ModuleId) -> CallbackResult {
        Ok(())
    }

    fn module_load_finished(&self, module: ModuleId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn module_unload_started(&self, module: ModuleId) -> CallbackResult {
        Ok(())
    }

    fn module_unload_finished(&self, module: ModuleId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn module_attached_to_assembly(&self, module: ModuleId, assembly: AssemblyId) -> CallbackResult {
        Ok(())
    }

    fn class_load_started(&self, class: ClassId) -> CallbackResult {
        Ok(())
    }

    fn class_load_finished(&self, class: ClassId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn class_unload_started(&self, class: ClassId) -> CallbackResult {
        Ok(())
    }

    fn class_unload_finished(&self, class: ClassId, status: StatusCode) -> CallbackResult {
        Ok(())
    }

    fn function_unload_started(&self, function: FunctionId) -> CallbackResult {
        Ok(())
    }

    // JIT

    fn jit_compilation_started(&self, function: FunctionId, safe_to_block: bool) -> CallbackResult {
        Ok(())
    }

    fn jit_compilation_finished(
        &self,
        function: FunctionId,
        status: StatusCode,
        safe_to_block: bool,
    ) -> CallbackResult {
        Ok(())
    }

    /// Gate: `Ok(true)` lets the engine use precompiled code
    fn jit_cached_function_search_started(&self, function: FunctionId) -> CallbackResult<bool> {
        Ok(true)
    }

    fn jit_cached_function_search_finished(
        &self,
        function: FunctionId,
        result: CacheLookup,
    ) -> CallbackResult {
        Ok(())
    }

    /// Gate: `Ok(true)` lets the engine inline `callee` into `caller`
    fn jit_inlining(&self, caller: FunctionId, callee: FunctionId) -> CallbackResult<bool> {
        Ok(true)
    }

    // Threads and transitions

    fn thread_created(&self, thread: ThreadId) -> CallbackResult {
        Ok(())
    }

    fn thread_destroyed(&self, thread: ThreadId) -> CallbackResult {
        Ok(())
    }

    fn thread_assigned_to_os_thread(&self, thread: ThreadId, os_thread: u32) -> CallbackResult {
        Ok(())
    }

    fn managed_to_unmanaged_transition(
        &self,
        function: FunctionId,
        reason: TransitionReason,
    ) -> CallbackResult {
        Ok(())
    }

    fn unmanaged_to_managed_transition(
        &self,
        function: FunctionId,
        reason: TransitionReason,
    ) -> CallbackResult {
        Ok(())
    }

    // Suspension

    fn runtime_suspend_started(&self, reason: SuspendReason) -> CallbackResult {
        Ok(())
    }

    fn runtime_suspend_finished(&self) -> CallbackResult {
        Ok(())
    }

    fn runtime_suspend_aborted(&self) -> CallbackResult {
        Ok(())
    }

    fn runtime_resume_started(&self) -> CallbackResult {
        Ok(())
    }

    fn runtime_resume_finished(&self) -> CallbackResult {
        Ok(())
    }

    fn runtime_thread_suspended(&self, thread: ThreadId) -> CallbackResult {
        Ok(())
    }

    fn runtime_thread_resumed(&self, thread: ThreadId) -> CallbackResult {
        Ok(())
    }

    // Heap

    /// Relocated ranges in the 32-bit shape
    fn moved_references(&self, batch: &NarrowMovedRangeBatch) -> CallbackResult {
        Ok(())
    }

    fn object_allocated(&self, object: ManagedObjectRef, class: ClassId) -> CallbackResult {
        Ok(())
    }

    /// Unannotated roots, deduplicated within the cycle
    fn root_references(&self, roots: &[ObjectId]) -> CallbackResult {
        Ok(())
    }

    // Exceptions

    fn exception_thrown(&self, exception: ManagedObjectRef) -> CallbackResult {
        Ok(())
    }

    fn exception_search_function_enter(&self, function: FunctionId) -> CallbackResult {
        Ok(())
    }

    fn exception_search_function_leave(&self) -> CallbackResult {
        Ok(())
    }

    fn exception_unwind_function_enter(&self, function: FunctionId) -> CallbackResult {
        Ok(())
    }

    fn exception_unwind_function_leave(&self) -> CallbackResult {
        Ok(())
    }

    fn exception_catcher_enter(
        &self,
        function: FunctionId,
        exception: ManagedObjectRef,
    ) -> CallbackResult {
        Ok(())
    }

    fn exception_catcher_leave(&self) -> CallbackResult {
        Ok(())
    }

    fn exception_clr_catcher_found(&self) -> CallbackResult {
        Ok(())
    }

    fn exception_clr_catcher_execute(&self) -> CallbackResult {
        Ok(())
    }

    // Version queries

    fn as_v2(&self) -> Option<&dyn ProfilerCallback2> {
        None
    }

    fn as_v3(&self) -> Option<&dyn ProfilerCallback3> {
        None
    }

    fn as_v4(&self) -> Option<&dyn ProfilerCallback4> {
        None
    }

    fn as_v5(&self) -> Option<&dyn ProfilerCallback5> {
        None
    }
}

/// Collection brackets, survivors, annotated roots and handles
#[allow(unused_variables)]
pub trait ProfilerCallback2: ProfilerCallback {
    fn thread_name_changed(&self, thread: ThreadId, name: &str) -> CallbackResult {
        Ok(())
    }

    fn garbage_collection_started(
        &self,
        generations: GenerationSet,
        reason: GcReason,
    ) -> CallbackResult {
        Ok(())
    }

    /// Ranges that survived in place, 32-bit shape
    fn surviving_references(&self, batch: &NarrowSurvivedRangeBatch) -> CallbackResult {
        Ok(())
    }

    fn garbage_collection_finished(&self) -> CallbackResult {
        Ok(())
    }

    fn finalizeable_object_queued(
        &self,
        flags: FinalizerFlags,
        object: ManagedObjectRef,
    ) -> CallbackResult {
        Ok(())
    }

    /// Annotated roots, preferred over `root_references`
    fn root_references2(&self, roots: &[RootReference]) -> CallbackResult {
        Ok(())
    }

    fn handle_created(&self, handle: GcHandleId, target: Option<ManagedObjectRef>) -> CallbackResult {
        Ok(())
    }

    fn handle_destroyed(&self, handle: GcHandleId) -> CallbackResult {
        Ok(())
    }
}

/// Attach to a running process and detach
#[allow(unused_variables)]
pub trait ProfilerCallback3: ProfilerCallback2 {
    /// Initialization when loaded into a running process
    ///
    /// `client_data` is only valid for the duration of the call.
    fn initialize_for_attach(&self, info: ProfilerInfo, client_data: &[u8]) -> CallbackResult {
        Ok(())
    }

    fn profiler_attach_complete(&self) -> CallbackResult {
        Ok(())
    }

    /// Final callback; the observer may be unloaded once it returns
    fn profiler_detach_succeeded(&self) -> CallbackResult {
        Ok(())
    }
}

/// Recompilation and pointer-sized range batches
#[allow(unused_variables)]
pub trait ProfilerCallback4: ProfilerCallback3 {
    fn rejit_compilation_started(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        safe_to_block: bool,
    ) -> CallbackResult {
        Ok(())
    }

    /// Supply parameters for one revision
    ///
    /// Called once per revision before compilation. `control` is sealed as
    /// soon as this returns.
    fn get_rejit_parameters(
        &self,
        module: ModuleId,
        method: MdToken,
        control: &FunctionControl,
    ) -> CallbackResult {
        Ok(())
    }

    fn rejit_compilation_finished(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        status: StatusCode,
        safe_to_block: bool,
    ) -> CallbackResult {
        Ok(())
    }

    fn rejit_error(
        &self,
        module: ModuleId,
        method: MdToken,
        function: Option<FunctionId>,
        status: StatusCode,
    ) -> CallbackResult {
        Ok(())
    }

    /// Relocated ranges, canonical pointer-sized shape
    fn moved_references2(&self, batch: &MovedRangeBatch) -> CallbackResult {
        Ok(())
    }

    fn surviving_references2(&self, batch: &SurvivedRangeBatch) -> CallbackResult {
        Ok(())
    }
}

#[allow(unused_variables)]
pub trait ProfilerCallback5: ProfilerCallback4 {
    fn conditional_weak_table_element_references(
        &self,
        keys: &[ObjectId],
        values: &[ObjectId],
    ) -> CallbackResult {
        Ok(())
    }

    fn dynamic_function_unloaded(&self, function: FunctionId) -> CallbackResult {
        Ok(())
    }
}

/// Advertise the callback versions an observer implements
///
/// Expands to the `as_vN` query methods up to the given version; use it
/// inside `impl ProfilerCallback for ...`.
///
/// ```ignore
/// impl ProfilerCallback for Tracer {
///     profiler_broker::impl_callback_versions!(v4);
/// }
/// ```
#[macro_export]
macro_rules! impl_callback_versions {
    (v2) => {
        fn as_v2(&self) -> Option<&dyn $crate::callbacks::ProfilerCallback2> {
            Some(self)
        }
    };
    (v3) => {
        $crate::impl_callback_versions!(v2);
        fn as_v3(&self) -> Option<&dyn $crate::callbacks::ProfilerCallback3> {
            Some(self)
        }
    };
    (v4) => {
        $crate::impl_callback_versions!(v3);
        fn as_v4(&self) -> Option<&dyn $crate::callbacks::ProfilerCallback4> {
            Some(self)
        }
    };
    (v5) => {
        $crate::impl_callback_versions!(v4);
        fn as_v5(&self) -> Option<&dyn $crate::callbacks::ProfilerCallback5> {
            Some(self)
        }
    };
}
