/*!
 * Engine Events
 *
 * Plain notifications that carry no broker-side bookkeeping. Events that
 * update broker tables (JIT, collection, recompilation) have dedicated entry
 * points on the broker instead.
 */

use super::set::CallbackSet;
use super::types::{CallbackVersion, TransitionReason};
use crate::core::errors::CallbackResult;
use crate::core::types::{
    AppDomainId, AssemblyId, ClassId, FunctionId, ModuleId, StatusCode, ThreadId,
};
use crate::mask::EventCategory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    AppDomainCreationStarted { domain: AppDomainId },
    AppDomainCreationFinished { domain: AppDomainId, status: StatusCode },
    AppDomainShutdownStarted { domain: AppDomainId },
    AppDomainShutdownFinished { domain: AppDomainId, status: StatusCode },
    AssemblyLoadStarted { assembly: AssemblyId },
    AssemblyLoadFinished { assembly: AssemblyId, status: StatusCode },
    AssemblyUnloadStarted { assembly: AssemblyId },
    AssemblyUnloadFinished { assembly: AssemblyId, status: StatusCode },
    ModuleLoadStarted { module: ModuleId },
    ModuleUnloadStarted { module: ModuleId },
    ModuleAttachedToAssembly { module: ModuleId, assembly: AssemblyId },
    ClassLoadStarted { class: ClassId },
    ClassLoadFinished { class: ClassId, status: StatusCode },
    ClassUnloadStarted { class: ClassId },
    ClassUnloadFinished { class: ClassId, status: StatusCode },
    ThreadCreated { thread: ThreadId },
    ThreadDestroyed { thread: ThreadId },
    ThreadAssignedToOsThread { thread: ThreadId, os_thread: u32 },
    ThreadNameChanged { thread: ThreadId, name: String },
    RuntimeThreadSuspended { thread: ThreadId },
    RuntimeThreadResumed { thread: ThreadId },
    ManagedToUnmanaged { function: FunctionId, reason: TransitionReason },
    UnmanagedToManaged { function: FunctionId, reason: TransitionReason },
    ExceptionSearchFunctionEnter { function: FunctionId },
    ExceptionSearchFunctionLeave,
    ExceptionUnwindFunctionEnter { function: FunctionId },
    ExceptionUnwindFunctionLeave,
    ExceptionCatcherLeave,
    ExceptionClrCatcherFound,
    ExceptionClrCatcherExecute,
}

impl EngineEvent {
    pub fn category(&self) -> EventCategory {
        use EngineEvent::*;
        match self {
            AppDomainCreationStarted { .. }
            | AppDomainCreationFinished { .. }
            | AppDomainShutdownStarted { .. }
            | AppDomainShutdownFinished { .. } => EventCategory::AppDomainLoads,
            AssemblyLoadStarted { .. }
            | AssemblyLoadFinished { .. }
            | AssemblyUnloadStarted { .. }
            | AssemblyUnloadFinished { .. } => EventCategory::AssemblyLoads,
            ModuleLoadStarted { .. }
            | ModuleUnloadStarted { .. }
            | ModuleAttachedToAssembly { .. } => EventCategory::ModuleLoads,
            ClassLoadStarted { .. }
            | ClassLoadFinished { .. }
            | ClassUnloadStarted { .. }
            | ClassUnloadFinished { .. } => EventCategory::ClassLoads,
            ThreadCreated { .. }
            | ThreadDestroyed { .. }
            | ThreadAssignedToOsThread { .. }
            | ThreadNameChanged { .. } => EventCategory::Threads,
            RuntimeThreadSuspended { .. } | RuntimeThreadResumed { .. } => EventCategory::Suspends,
            ManagedToUnmanaged { .. } | UnmanagedToManaged { .. } => EventCategory::CodeTransitions,
            ExceptionSearchFunctionEnter { .. }
            | ExceptionSearchFunctionLeave
            | ExceptionUnwindFunctionEnter { .. }
            | ExceptionUnwindFunctionLeave
            | ExceptionCatcherLeave => EventCategory::Exceptions,
            ExceptionClrCatcherFound | ExceptionClrCatcherExecute => EventCategory::ClrExceptions,
        }
    }

    /// Lowest callback interface that can receive this event
    pub fn min_version(&self) -> CallbackVersion {
        match self {
            EngineEvent::ThreadNameChanged { .. } => CallbackVersion::V2,
            _ => CallbackVersion::V1,
        }
    }

    pub fn name(&self) -> &'static str {
        use EngineEvent::*;
        match self {
            AppDomainCreationStarted { .. } => "app_domain_creation_started",
            AppDomainCreationFinished { .. } => "app_domain_creation_finished",
            AppDomainShutdownStarted { .. } => "app_domain_shutdown_started",
            AppDomainShutdownFinished { .. } => "app_domain_shutdown_finished",
            AssemblyLoadStarted { .. } => "assembly_load_started",
            AssemblyLoadFinished { .. } => "assembly_load_finished",
            AssemblyUnloadStarted { .. } => "assembly_unload_started",
            AssemblyUnloadFinished { .. } => "assembly_unload_finished",
            ModuleLoadStarted { .. } => "module_load_started",
            ModuleUnloadStarted { .. } => "module_unload_started",
            ModuleAttachedToAssembly { .. } => "module_attached_to_assembly",
            ClassLoadStarted { .. } => "class_load_started",
            ClassLoadFinished { .. } => "class_load_finished",
            ClassUnloadStarted { .. } => "class_unload_started",
            ClassUnloadFinished { .. } => "class_unload_finished",
            ThreadCreated { .. } => "thread_created",
            ThreadDestroyed { .. } => "thread_destroyed",
            ThreadAssignedToOsThread { .. } => "thread_assigned_to_os_thread",
            ThreadNameChanged { .. } => "thread_name_changed",
            RuntimeThreadSuspended { .. } => "runtime_thread_suspended",
            RuntimeThreadResumed { .. } => "runtime_thread_resumed",
            ManagedToUnmanaged { .. } => "managed_to_unmanaged_transition",
            UnmanagedToManaged { .. } => "unmanaged_to_managed_transition",
            ExceptionSearchFunctionEnter { .. } => "exception_search_function_enter",
            ExceptionSearchFunctionLeave => "exception_search_function_leave",
            ExceptionUnwindFunctionEnter { .. } => "exception_unwind_function_enter",
            ExceptionUnwindFunctionLeave => "exception_unwind_function_leave",
            ExceptionCatcherLeave => "exception_catcher_leave",
            ExceptionClrCatcherFound => "exception_clr_catcher_found",
            ExceptionClrCatcherExecute => "exception_clr_catcher_execute",
        }
    }

    /// Invoke the matching observer callback
    pub(crate) fn deliver(&self, set: &CallbackSet) -> CallbackResult {
        use EngineEvent::*;
        let cb = set.v1();
        match self {
            AppDomainCreationStarted { domain } => cb.app_domain_creation_started(*domain),
            AppDomainCreationFinished { domain, status } => {
                cb.app_domain_creation_finished(*domain, *status)
            }
            AppDomainShutdownStarted { domain } => cb.app_domain_shutdown_started(*domain),
            AppDomainShutdownFinished { domain, status } => {
                cb.app_domain_shutdown_finished(*domain, *status)
            }
            AssemblyLoadStarted { assembly } => cb.assembly_load_started(*assembly),
            AssemblyLoadFinished { assembly, status } => cb.assembly_load_finished(*assembly, *status),
            AssemblyUnloadStarted { assembly } => cb.assembly_unload_started(*assembly),
            AssemblyUnloadFinished { assembly, status } => {
                cb.assembly_unload_finished(*assembly, *status)
            }
            ModuleLoadStarted { module } => cb.module_load_started(*module),
            ModuleUnloadStarted { module } => cb.module_unload_started(*module),
            ModuleAttachedToAssembly { module, assembly } => {
                cb.module_attached_to_assembly(*module, *assembly)
            }
            ClassLoadStarted { class } => cb.class_load_started(*class),
            ClassLoadFinished { class, status } => cb.class_load_finished(*class, *status),
            ClassUnloadStarted { class } => cb.class_unload_started(*class),
            ClassUnloadFinished { class, status } => cb.class_unload_finished(*class, *status),
            ThreadCreated { thread } => cb.thread_created(*thread),
            ThreadDestroyed { thread } => cb.thread_destroyed(*thread),
            ThreadAssignedToOsThread { thread, os_thread } => {
                cb.thread_assigned_to_os_thread(*thread, *os_thread)
            }
            ThreadNameChanged { thread, name } => match set.v2() {
                Some(v2) => v2.thread_name_changed(*thread, name),
                None => Ok(()),
            },
            RuntimeThreadSuspended { thread } => cb.runtime_thread_suspended(*thread),
            RuntimeThreadResumed { thread } => cb.runtime_thread_resumed(*thread),
            ManagedToUnmanaged { function, reason } => {
                cb.managed_to_unmanaged_transition(*function, *reason)
            }
            UnmanagedToManaged { function, reason } => {
                cb.unmanaged_to_managed_transition(*function, *reason)
            }
            ExceptionSearchFunctionEnter { function } => cb.exception_search_function_enter(*function),
            ExceptionSearchFunctionLeave => cb.exception_search_function_leave(),
            ExceptionUnwindFunctionEnter { function } => cb.exception_unwind_function_enter(*function),
            ExceptionUnwindFunctionLeave => cb.exception_unwind_function_leave(),
            ExceptionCatcherLeave => cb.exception_catcher_leave(),
            ExceptionClrCatcherFound => cb.exception_clr_catcher_found(),
            ExceptionClrCatcherExecute => cb.exception_clr_catcher_execute(),
        }
    }
}
