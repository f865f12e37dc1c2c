/*!
 * Shared Test Fixtures
 * Fake engine services and a recording observer
 */

#![allow(dead_code)]

use parking_lot::Mutex;
use profiler_broker::callbacks::{
    JitTarget, ProfilerCallback, ProfilerCallback2, ProfilerCallback3, ProfilerCallback4,
    ProfilerCallback5,
};
use profiler_broker::code::CodeRange;
use profiler_broker::core::{
    AppDomainId, AssemblyId, BrokerError, BrokerResult, CallbackError, CallbackResult, ClassId,
    FunctionId, MdToken, MethodKey, ModuleId, ReJitId, StatusCode, ThreadId,
};
use profiler_broker::mask::{EventMask, HighMonitorFlags, MonitorFlags};
use profiler_broker::objects::{
    GcCycleSummary, GcReason, GenerationSet, ManagedObjectRef, MovedRangeBatch,
    NarrowMovedRangeBatch, ObjectId, RootReference, SurvivedRangeBatch, SuspendReason,
};
use profiler_broker::rejit::{CodegenFlags, FunctionControl};
use profiler_broker::services::{
    AssemblyInfo, ClassInfo, EngineControl, FunctionInfo, MetadataImport, MetadataProvider,
    ModuleFlags, ModuleInfo, RawFrame, ThreadControl,
};
use profiler_broker::{Broker, ProfilerInfo};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Module whose precompiled code carries no inlining records
pub const UNTRACKED_MODULE: ModuleId = ModuleId(9);

pub fn method(token: u32) -> MethodKey {
    MethodKey::new(ModuleId(1), MdToken(0x0600_0000 | token))
}

// =============================================================================
// Fake engine
// =============================================================================

pub struct FakeEngine {
    pub current: ThreadId,
    stacks: Mutex<HashMap<ThreadId, Vec<RawFrame>>>,
    exited: Mutex<HashSet<ThreadId>>,
    pub thread_log: Mutex<Vec<String>>,
    pub forced_gcs: AtomicUsize,
    pub walks_supported: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: ThreadId(1),
            stacks: Mutex::new(HashMap::new()),
            exited: Mutex::new(HashSet::new()),
            thread_log: Mutex::new(Vec::new()),
            forced_gcs: AtomicUsize::new(0),
            walks_supported: AtomicBool::new(true),
        })
    }

    /// Frames are given innermost first
    pub fn set_stack(&self, thread: ThreadId, ips: &[usize]) {
        let frames = ips
            .iter()
            .map(|ip| RawFrame {
                ip: *ip,
                frame_token: *ip as u64 ^ 0xF00D,
                context: vec![0xCC; 8],
            })
            .collect();
        self.stacks.lock().insert(thread, frames);
    }

    pub fn exit_thread(&self, thread: ThreadId) {
        self.exited.lock().insert(thread);
    }
}

impl MetadataProvider for FakeEngine {
    fn class_of_object(&self, _object: ObjectId) -> BrokerResult<ClassId> {
        Ok(ClassId(0x77))
    }

    fn class_info(&self, class: ClassId) -> BrokerResult<ClassInfo> {
        Ok(ClassInfo {
            module: ModuleId(1),
            token: MdToken(0x0200_0000 | class.0 as u32),
        })
    }

    fn function_info(&self, function: FunctionId) -> BrokerResult<FunctionInfo> {
        Ok(FunctionInfo {
            class: ClassId(0x10),
            module: ModuleId(1),
            token: MdToken(0x0600_0000 | function.0 as u32),
        })
    }

    fn module_info(&self, module: ModuleId) -> BrokerResult<ModuleInfo> {
        let flags = if module == UNTRACKED_MODULE {
            ModuleFlags::PRECOMPILED
        } else {
            ModuleFlags::empty()
        };
        Ok(ModuleInfo {
            base_address: 0x4000_0000 + module.0 as usize * 0x10_0000,
            name: format!("module{}.dll", module.0),
            assembly: AssemblyId(module.0),
            flags,
        })
    }

    fn assembly_info(&self, assembly: AssemblyId) -> BrokerResult<AssemblyInfo> {
        Ok(AssemblyInfo {
            name: format!("assembly{}", assembly.0),
            app_domain: AppDomainId(1),
            manifest_module: ModuleId(assembly.0),
        })
    }

    fn metadata_importer(&self, _module: ModuleId) -> BrokerResult<Arc<dyn MetadataImport>> {
        Err(BrokerError::NotAvailable("no metadata importer in tests".into()))
    }
}

impl ThreadControl for FakeEngine {
    fn current_thread(&self) -> Option<ThreadId> {
        Some(self.current)
    }

    fn supports_stack_walks(&self) -> bool {
        self.walks_supported.load(Ordering::SeqCst)
    }

    fn suspend(&self, thread: ThreadId) -> BrokerResult<()> {
        self.thread_log.lock().push(format!("suspend {}", thread.0));
        Ok(())
    }

    fn resume(&self, thread: ThreadId) -> BrokerResult<()> {
        self.thread_log.lock().push(format!("resume {}", thread.0));
        Ok(())
    }

    fn capture_stack(
        &self,
        thread: ThreadId,
        _seed_context: Option<&[u8]>,
        with_context: bool,
    ) -> BrokerResult<Vec<RawFrame>> {
        if self.exited.lock().contains(&thread) {
            return Err(BrokerError::Engine(format!("thread {} exited", thread.0)));
        }
        let frames = self.stacks.lock().get(&thread).cloned().unwrap_or_default();
        Ok(frames
            .into_iter()
            .map(|frame| RawFrame {
                context: if with_context { frame.context } else { Vec::new() },
                ..frame
            })
            .collect())
    }
}

impl EngineControl for FakeEngine {
    fn force_gc(&self) -> BrokerResult<()> {
        self.forced_gcs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_instrumented_thread(&self) -> BrokerResult<ThreadId> {
        Ok(ThreadId(0xD1))
    }
}

pub fn broker_with(engine: &Arc<FakeEngine>) -> Broker {
    Broker::builder().with_engine(Arc::clone(engine)).build()
}

// =============================================================================
// Recording observer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Initialize,
    AttachComplete,
    DetachSucceeded,
    Shutdown,
    JitStarted(FunctionId),
    JitFinished(FunctionId, StatusCode),
    Inlining(FunctionId, FunctionId),
    Exception,
    ObjectAllocated(ManagedObjectRef),
    GcStarted(GenerationSet),
    Moved(Vec<(usize, usize, usize)>),
    Survived(Vec<(usize, usize)>),
    Roots(Vec<RootReference>),
    GcFinished,
    Suspend,
    Resume,
    ThreadCreated(ThreadId),
    RejitParameters(MethodKey),
    RejitStarted(FunctionId, ReJitId),
    RejitFinished(FunctionId, ReJitId, StatusCode),
    RejitError(MethodKey, StatusCode),
}

impl Seen {
    pub fn is_gc(&self) -> bool {
        matches!(
            self,
            Seen::GcStarted(_)
                | Seen::Moved(_)
                | Seen::Survived(_)
                | Seen::Roots(_)
                | Seen::GcFinished
                | Seen::Suspend
                | Seen::Resume
        )
    }
}

/// Observer implementing every callback version, recording what it sees
pub struct Recorder {
    mask: EventMask,
    seen: Mutex<Vec<Seen>>,
    info: Mutex<Option<ProfilerInfo>>,
    pub codegen: Mutex<CodegenFlags>,
    pub fail_parameters: AtomicBool,
    pub fail_initialize: AtomicBool,
    pub deny_inlining: AtomicBool,
}

impl Recorder {
    pub fn new(mask: EventMask) -> Arc<Self> {
        Arc::new(Self {
            mask,
            seen: Mutex::new(Vec::new()),
            info: Mutex::new(None),
            codegen: Mutex::new(CodegenFlags::empty()),
            fail_parameters: AtomicBool::new(false),
            fail_initialize: AtomicBool::new(false),
            deny_inlining: AtomicBool::new(false),
        })
    }

    pub fn with_low(flags: MonitorFlags) -> Arc<Self> {
        Self::new(EventMask::low(flags))
    }

    pub fn gc_mask() -> EventMask {
        EventMask::new(
            MonitorFlags::GC | MonitorFlags::SUSPENDS,
            HighMonitorFlags::BASIC_GC | HighMonitorFlags::GC_MOVED_OBJECTS,
        )
    }

    pub fn info(&self) -> ProfilerInfo {
        self.info
            .lock()
            .clone()
            .expect("observer was never initialized")
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Seen) -> bool) -> usize {
        self.seen.lock().iter().filter(|s| pred(s)).count()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }

    fn push(&self, seen: Seen) -> CallbackResult {
        self.seen.lock().push(seen);
        Ok(())
    }

    fn start(&self, info: ProfilerInfo) -> CallbackResult {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(CallbackError::failed("refusing to initialize"));
        }
        info.set_event_mask(self.mask)?;
        *self.info.lock() = Some(info);
        self.push(Seen::Initialize)
    }
}

impl ProfilerCallback for Recorder {
    profiler_broker::impl_callback_versions!(v5);

    fn initialize(&self, info: ProfilerInfo) -> CallbackResult {
        self.start(info)
    }

    fn shutdown(&self) -> CallbackResult {
        self.push(Seen::Shutdown)
    }

    fn jit_compilation_started(&self, function: FunctionId, _safe_to_block: bool) -> CallbackResult {
        self.push(Seen::JitStarted(function))
    }

    fn jit_compilation_finished(
        &self,
        function: FunctionId,
        status: StatusCode,
        _safe_to_block: bool,
    ) -> CallbackResult {
        self.push(Seen::JitFinished(function, status))
    }

    fn jit_inlining(&self, caller: FunctionId, callee: FunctionId) -> CallbackResult<bool> {
        self.push(Seen::Inlining(caller, callee))?;
        Ok(!self.deny_inlining.load(Ordering::SeqCst))
    }

    fn thread_created(&self, thread: ThreadId) -> CallbackResult {
        self.push(Seen::ThreadCreated(thread))
    }

    fn runtime_suspend_finished(&self) -> CallbackResult {
        self.push(Seen::Suspend)
    }

    fn runtime_resume_finished(&self) -> CallbackResult {
        self.push(Seen::Resume)
    }

    fn moved_references(&self, batch: &NarrowMovedRangeBatch) -> CallbackResult {
        self.push(Seen::Moved(batch.iter().collect()))
    }

    fn object_allocated(&self, object: ManagedObjectRef, _class: ClassId) -> CallbackResult {
        self.push(Seen::ObjectAllocated(object))
    }

    fn exception_thrown(&self, _exception: ManagedObjectRef) -> CallbackResult {
        self.push(Seen::Exception)
    }
}

impl ProfilerCallback2 for Recorder {
    fn garbage_collection_started(
        &self,
        generations: GenerationSet,
        _reason: GcReason,
    ) -> CallbackResult {
        self.push(Seen::GcStarted(generations))
    }

    fn garbage_collection_finished(&self) -> CallbackResult {
        self.push(Seen::GcFinished)
    }

    fn root_references2(&self, roots: &[RootReference]) -> CallbackResult {
        self.push(Seen::Roots(roots.to_vec()))
    }
}

impl ProfilerCallback3 for Recorder {
    fn initialize_for_attach(&self, info: ProfilerInfo, _client_data: &[u8]) -> CallbackResult {
        self.start(info)
    }

    fn profiler_attach_complete(&self) -> CallbackResult {
        self.push(Seen::AttachComplete)
    }

    fn profiler_detach_succeeded(&self) -> CallbackResult {
        self.push(Seen::DetachSucceeded)
    }
}

impl ProfilerCallback4 for Recorder {
    fn get_rejit_parameters(
        &self,
        module: ModuleId,
        method: MdToken,
        control: &FunctionControl,
    ) -> CallbackResult {
        self.push(Seen::RejitParameters(MethodKey::new(module, method)))?;
        if self.fail_parameters.load(Ordering::SeqCst) {
            return Err(CallbackError::failed("no parameters for you"));
        }
        control.set_codegen_flags(*self.codegen.lock())?;
        Ok(())
    }

    fn rejit_compilation_started(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        _safe_to_block: bool,
    ) -> CallbackResult {
        self.push(Seen::RejitStarted(function, rejit))
    }

    fn rejit_compilation_finished(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        status: StatusCode,
        _safe_to_block: bool,
    ) -> CallbackResult {
        self.push(Seen::RejitFinished(function, rejit, status))
    }

    fn rejit_error(
        &self,
        module: ModuleId,
        method: MdToken,
        _function: Option<FunctionId>,
        status: StatusCode,
    ) -> CallbackResult {
        self.push(Seen::RejitError(MethodKey::new(module, method), status))
    }

    fn moved_references2(&self, batch: &MovedRangeBatch) -> CallbackResult {
        self.push(Seen::Moved(batch.iter().collect()))
    }

    fn surviving_references2(&self, batch: &SurvivedRangeBatch) -> CallbackResult {
        self.push(Seen::Survived(batch.iter().collect()))
    }
}

impl ProfilerCallback5 for Recorder {}

/// Observer that only implements the first callback version
pub struct Legacy {
    mask: EventMask,
    pub moved: Mutex<Vec<(usize, usize, usize)>>,
}

impl Legacy {
    pub fn new(mask: EventMask) -> Arc<Self> {
        Arc::new(Self {
            mask,
            moved: Mutex::new(Vec::new()),
        })
    }
}

impl ProfilerCallback for Legacy {
    fn initialize(&self, info: ProfilerInfo) -> CallbackResult {
        info.set_event_mask(self.mask)?;
        Ok(())
    }

    fn moved_references(&self, batch: &NarrowMovedRangeBatch) -> CallbackResult {
        self.moved.lock().extend(batch.iter());
        Ok(())
    }
}

// =============================================================================
// Engine drivers
// =============================================================================

/// Drive one complete suspend / collect / resume bracket
pub fn run_collection(
    broker: &Broker,
    generations: GenerationSet,
    moved: &MovedRangeBatch,
    survived: &SurvivedRangeBatch,
) -> GcCycleSummary {
    broker.runtime_suspend_started(SuspendReason::Gc).unwrap();
    broker.runtime_suspend_finished().unwrap();
    broker
        .garbage_collection_started(generations, GcReason::Other)
        .unwrap();
    if !moved.is_empty() {
        broker.moved_references(moved).unwrap();
    }
    if !survived.is_empty() {
        broker.surviving_references(survived).unwrap();
    }
    let summary = broker.garbage_collection_finished().unwrap();
    broker.runtime_resume_started().unwrap();
    broker.runtime_resume_finished().unwrap();
    summary
}

/// Compile the original body of `method` as `function` at `code`
pub fn jit(broker: &Broker, function: FunctionId, method: MethodKey, code: CodeRange) {
    let target = JitTarget::new(function, method);
    broker.jit_compilation_started(target, true);
    broker
        .jit_compilation_finished(target, code, StatusCode::OK, true)
        .unwrap();
}
