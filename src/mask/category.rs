/*!
 * Event Categories
 * Mapping from callback families to the mask bits that enable them
 */

use super::flags::{EventMask, HighMonitorFlags, MonitorFlags};
use serde::{Deserialize, Serialize};

/// One family of observer callbacks
///
/// A category is enabled when ANY of its gating bits is set; the table is
/// fixed at compile time so the dispatch-site test is a single AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventCategory {
    FunctionUnloads,
    ClassLoads,
    ModuleLoads,
    AssemblyLoads,
    AppDomainLoads,
    JitCompilation,
    CacheSearches,
    Exceptions,
    ClrExceptions,
    /// Collection started/finished brackets
    GcLifecycle,
    /// Moved and survived range batches
    GcMovedObjects,
    /// Root references, finalizer queue, GC handles
    GcRoots,
    ObjectAllocated,
    LargeObjectAllocated,
    PinnedObjectAllocated,
    Threads,
    Suspends,
    CodeTransitions,
    EnterLeave,
    Rejit,
    StackSnapshot,
    DynamicFunctionUnloads,
}

impl EventCategory {
    pub const ALL: [EventCategory; 22] = [
        EventCategory::FunctionUnloads,
        EventCategory::ClassLoads,
        EventCategory::ModuleLoads,
        EventCategory::AssemblyLoads,
        EventCategory::AppDomainLoads,
        EventCategory::JitCompilation,
        EventCategory::CacheSearches,
        EventCategory::Exceptions,
        EventCategory::ClrExceptions,
        EventCategory::GcLifecycle,
        EventCategory::GcMovedObjects,
        EventCategory::GcRoots,
        EventCategory::ObjectAllocated,
        EventCategory::LargeObjectAllocated,
        EventCategory::PinnedObjectAllocated,
        EventCategory::Threads,
        EventCategory::Suspends,
        EventCategory::CodeTransitions,
        EventCategory::EnterLeave,
        EventCategory::Rejit,
        EventCategory::StackSnapshot,
        EventCategory::DynamicFunctionUnloads,
    ];

    /// Bits gating this category (enabled if any is set)
    pub const fn gate(self) -> EventMask {
        match self {
            EventCategory::FunctionUnloads => EventMask::low(MonitorFlags::FUNCTION_UNLOADS),
            EventCategory::ClassLoads => EventMask::low(MonitorFlags::CLASS_LOADS),
            EventCategory::ModuleLoads => EventMask::low(MonitorFlags::MODULE_LOADS),
            EventCategory::AssemblyLoads => EventMask::low(MonitorFlags::ASSEMBLY_LOADS),
            EventCategory::AppDomainLoads => EventMask::low(MonitorFlags::APPDOMAIN_LOADS),
            EventCategory::JitCompilation => EventMask::low(MonitorFlags::JIT_COMPILATION),
            EventCategory::CacheSearches => EventMask::low(MonitorFlags::CACHE_SEARCHES),
            EventCategory::Exceptions => EventMask::low(MonitorFlags::EXCEPTIONS),
            EventCategory::ClrExceptions => EventMask::low(MonitorFlags::CLR_EXCEPTIONS),
            EventCategory::GcLifecycle => {
                EventMask::new(MonitorFlags::GC, HighMonitorFlags::BASIC_GC)
            }
            EventCategory::GcMovedObjects => {
                EventMask::new(MonitorFlags::GC, HighMonitorFlags::GC_MOVED_OBJECTS)
            }
            EventCategory::GcRoots => EventMask::low(MonitorFlags::GC),
            EventCategory::ObjectAllocated => EventMask::low(MonitorFlags::OBJECT_ALLOCATED),
            EventCategory::LargeObjectAllocated => EventMask::new(
                MonitorFlags::OBJECT_ALLOCATED,
                HighMonitorFlags::LARGE_OBJECT_ALLOCATED,
            ),
            EventCategory::PinnedObjectAllocated => EventMask::new(
                MonitorFlags::OBJECT_ALLOCATED,
                HighMonitorFlags::PINNED_OBJECT_ALLOCATED,
            ),
            EventCategory::Threads => EventMask::low(MonitorFlags::THREADS),
            EventCategory::Suspends => EventMask::low(MonitorFlags::SUSPENDS),
            EventCategory::CodeTransitions => EventMask::low(MonitorFlags::CODE_TRANSITIONS),
            EventCategory::EnterLeave => EventMask::low(MonitorFlags::ENTERLEAVE),
            EventCategory::Rejit => EventMask::low(MonitorFlags::ENABLE_REJIT),
            EventCategory::StackSnapshot => EventMask::low(MonitorFlags::ENABLE_STACK_SNAPSHOT),
            EventCategory::DynamicFunctionUnloads => {
                EventMask::high(HighMonitorFlags::DYNAMIC_FUNCTION_UNLOADS)
            }
        }
    }

    /// Packed gate word for the hot-path test
    #[inline(always)]
    pub const fn gate_bits(self) -> u64 {
        self.gate().to_bits()
    }

    pub const fn name(self) -> &'static str {
        match self {
            EventCategory::FunctionUnloads => "function_unloads",
            EventCategory::ClassLoads => "class_loads",
            EventCategory::ModuleLoads => "module_loads",
            EventCategory::AssemblyLoads => "assembly_loads",
            EventCategory::AppDomainLoads => "appdomain_loads",
            EventCategory::JitCompilation => "jit_compilation",
            EventCategory::CacheSearches => "cache_searches",
            EventCategory::Exceptions => "exceptions",
            EventCategory::ClrExceptions => "clr_exceptions",
            EventCategory::GcLifecycle => "gc_lifecycle",
            EventCategory::GcMovedObjects => "gc_moved_objects",
            EventCategory::GcRoots => "gc_roots",
            EventCategory::ObjectAllocated => "object_allocated",
            EventCategory::LargeObjectAllocated => "large_object_allocated",
            EventCategory::PinnedObjectAllocated => "pinned_object_allocated",
            EventCategory::Threads => "threads",
            EventCategory::Suspends => "suspends",
            EventCategory::CodeTransitions => "code_transitions",
            EventCategory::EnterLeave => "enter_leave",
            EventCategory::Rejit => "rejit",
            EventCategory::StackSnapshot => "stack_snapshot",
            EventCategory::DynamicFunctionUnloads => "dynamic_function_unloads",
        }
    }
}

/// Engine-mutating operations available to the observer
///
/// Each is gated by mask bits distinct from the read-only query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    ForceGc,
    ReplaceMethodBody,
    EnterLeaveHooks,
    Rejit,
    InstrumentThread,
}

impl MutationKind {
    /// Bits of which at least one must be set for the mutation to be allowed
    pub const fn required(self) -> EventMask {
        match self {
            MutationKind::ForceGc => EventMask::new(
                MonitorFlags::GC,
                HighMonitorFlags::BASIC_GC.union(HighMonitorFlags::GC_MOVED_OBJECTS),
            ),
            MutationKind::ReplaceMethodBody => EventMask::low(MonitorFlags::JIT_COMPILATION),
            MutationKind::EnterLeaveHooks => EventMask::low(MonitorFlags::ENTERLEAVE),
            MutationKind::Rejit => EventMask::low(MonitorFlags::ENABLE_REJIT),
            MutationKind::InstrumentThread => {
                EventMask::low(MonitorFlags::ENABLE_INPROC_DEBUGGING)
            }
        }
    }
}
