/*!
 * Observer Info Handle
 *
 * `ProfilerInfo` is everything the observer may ask of the broker: mask
 * changes, identity and code queries, recompilation, stack snapshots and
 * engine mutations. It holds a weak reference to the broker and the id of
 * the session it was issued for, so a handle kept past detach fails with
 * `NotAttached` instead of reaching into the next session.
 */

use super::hooks::{EnterLeaveHooks, FunctionIdMapper};
use super::BrokerInner;
use crate::code::CompiledCodeRegion;
use crate::core::batch::BatchStatus;
use crate::core::errors::BrokerError;
use crate::core::id::SessionId;
use crate::core::limits::MAX_REJIT_BATCH;
use crate::core::types::{
    Address, AssemblyId, BrokerResult, ClassId, FunctionId, GcHandleId, IlToNativeEntry, MdToken,
    MethodKey, ModuleId, ReJitId, Size, ThreadId,
};
use crate::dispatch::LifecycleState;
use crate::mask::{EventCategory, EventMask, MonitorFlags, MutationKind, ObserverKind};
use crate::monitoring::{span_operation, DispatchStats};
use crate::objects::{GcPhase, Generation, ManagedObjectRef};
use crate::rejit::{InlinerEnumeration, RejitFlags, RejitState, RevisionInfo};
use crate::services::{AssemblyInfo, ClassInfo, FunctionInfo, MetadataImport, ModuleInfo};
use crate::stackwalk::{FrameInfo, WalkControl, WalkFlags, WalkOutcome};
use ahash::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a recompilation request that also covers inlining callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejitWithInliners {
    /// Outcome per requested method, in input order
    pub requested: BatchStatus<ReJitId>,
    /// Callers that had inlined a requested method, sorted
    pub inliner_methods: Vec<MethodKey>,
    /// Outcome per entry of `inliner_methods`
    pub inliners: BatchStatus<ReJitId>,
    /// Some loaded code carries no inlining records, so callers may be missing
    pub incomplete: bool,
}

/// Observer-side handle to the broker
#[derive(Clone)]
pub struct ProfilerInfo {
    inner: Weak<BrokerInner>,
    session: SessionId,
}

impl ProfilerInfo {
    pub(crate) fn new(inner: Weak<BrokerInner>, session: SessionId) -> Self {
        Self { inner, session }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    fn live(&self) -> BrokerResult<Arc<BrokerInner>> {
        let inner = self.inner.upgrade().ok_or(BrokerError::NotAttached)?;
        if !inner.lifecycle.is_current(self.session) {
            return Err(BrokerError::NotAttached);
        }
        Ok(inner)
    }

    // =========================================================================
    // Event mask
    // =========================================================================

    pub fn set_event_mask(&self, mask: EventMask) -> BrokerResult<()> {
        let inner = self.live()?;
        match inner.lifecycle.state() {
            LifecycleState::Initializing | LifecycleState::Attached => {}
            state => {
                return Err(BrokerError::invalid_state(format!(
                    "event mask cannot change while {:?}",
                    state
                )))
            }
        }
        inner.dispatcher.mask().set(mask)
    }

    pub fn event_mask(&self) -> BrokerResult<EventMask> {
        Ok(self.live()?.dispatcher.mask().get())
    }

    pub fn stats(&self) -> BrokerResult<DispatchStats> {
        Ok(self.live()?.dispatcher.stats().snapshot())
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Class of a live object; falls back to the engine for objects the
    /// broker never saw allocated
    pub fn class_from_object(&self, object: ManagedObjectRef) -> BrokerResult<ClassId> {
        let inner = self.live()?;
        match inner.objects.object_info(object) {
            Ok(tracked) => Ok(tracked.class),
            Err(BrokerError::NotFound(_)) => inner.services.metadata()?.class_of_object(object.id),
            Err(e) => Err(e),
        }
    }

    pub fn object_size(&self, object: ManagedObjectRef) -> BrokerResult<Size> {
        Ok(self.live()?.objects.object_info(object)?.size)
    }

    pub fn object_generation(&self, object: ManagedObjectRef) -> BrokerResult<Generation> {
        Ok(self.live()?.objects.object_info(object)?.generation)
    }

    /// Carry a reference from the previous epoch into the current one
    pub fn remap_object(&self, object: ManagedObjectRef) -> BrokerResult<ManagedObjectRef> {
        self.live()?.objects.remap(object)
    }

    pub fn handle_target(&self, handle: GcHandleId) -> BrokerResult<Option<ManagedObjectRef>> {
        self.live()?.objects.handle_target(handle)
    }

    pub fn gc_phase(&self) -> BrokerResult<GcPhase> {
        Ok(self.live()?.objects.phase())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn class_info(&self, class: ClassId) -> BrokerResult<ClassInfo> {
        self.live()?.services.metadata()?.class_info(class)
    }

    pub fn function_info(&self, function: FunctionId) -> BrokerResult<FunctionInfo> {
        self.live()?.services.metadata()?.function_info(function)
    }

    pub fn module_info(&self, module: ModuleId) -> BrokerResult<ModuleInfo> {
        self.live()?.services.metadata()?.module_info(module)
    }

    pub fn assembly_info(&self, assembly: AssemblyId) -> BrokerResult<AssemblyInfo> {
        self.live()?.services.metadata()?.assembly_info(assembly)
    }

    pub fn metadata_importer(&self, module: ModuleId) -> BrokerResult<Arc<dyn MetadataImport>> {
        self.live()?.services.metadata()?.metadata_importer(module)
    }

    // =========================================================================
    // Code
    // =========================================================================

    /// Resolve an instruction pointer to the function and revision executing there
    pub fn function_from_ip(&self, ip: Address) -> BrokerResult<(FunctionId, ReJitId)> {
        self.live()?.code.function_from_ip(ip)
    }

    pub fn code_regions(
        &self,
        function: FunctionId,
        rejit: Option<ReJitId>,
    ) -> BrokerResult<Vec<CompiledCodeRegion>> {
        self.live()?.code.code_regions(function, rejit)
    }

    pub fn il_to_native_map_len(
        &self,
        function: FunctionId,
        rejit: Option<ReJitId>,
    ) -> BrokerResult<usize> {
        let inner = self.live()?;
        let rejit = resolve_revision(&inner, function, rejit)?;
        inner.code.il_to_native_map_len(function, rejit)
    }

    /// Copy the map into `out`; `InsufficientBuffer` carries the length needed
    pub fn copy_il_to_native_map(
        &self,
        function: FunctionId,
        rejit: Option<ReJitId>,
        out: &mut [IlToNativeEntry],
    ) -> BrokerResult<usize> {
        let inner = self.live()?;
        let rejit = resolve_revision(&inner, function, rejit)?;
        inner.code.copy_il_to_native_map(function, rejit, out)
    }

    pub fn il_to_native_map(
        &self,
        function: FunctionId,
        rejit: Option<ReJitId>,
    ) -> BrokerResult<Vec<IlToNativeEntry>> {
        let inner = self.live()?;
        let rejit = resolve_revision(&inner, function, rejit)?;
        inner.code.il_to_native_map(function, rejit)
    }

    // =========================================================================
    // Engine mutations
    // =========================================================================

    /// Run a full blocking collection; not allowed while one is in progress
    pub fn force_gc(&self) -> BrokerResult<()> {
        let inner = self.live()?;
        inner.dispatcher.mask().check_mutation(MutationKind::ForceGc)?;
        let phase = inner.objects.phase();
        if phase != GcPhase::Idle {
            return Err(BrokerError::invalid_state(format!(
                "cannot force a collection during {:?}",
                phase
            )));
        }
        info!("observer forced a collection");
        inner.services.control()?.force_gc()
    }

    /// Replace the body of a method that has not been compiled yet
    pub fn set_il_function_body(
        &self,
        module: ModuleId,
        token: MdToken,
        body: &[u8],
    ) -> BrokerResult<()> {
        let inner = self.live()?;
        inner
            .dispatcher
            .mask()
            .check_mutation(MutationKind::ReplaceMethodBody)?;
        if body.is_empty() {
            return Err(BrokerError::invalid_argument("method body must not be empty"));
        }
        let method = MethodKey::new(module, token);
        if inner.jitted.contains(&method) {
            return Err(BrokerError::invalid_state(format!(
                "method {} has already been compiled; use recompilation instead",
                method
            )));
        }
        inner.replaced_bodies.insert(method, Arc::from(body));
        debug!(method = %method, len = body.len(), "replacement body stored");
        Ok(())
    }

    /// Install enter/leave probes; only from inside `initialize`
    pub fn set_enter_leave_hooks(&self, hooks: EnterLeaveHooks) -> BrokerResult<()> {
        let inner = self.live()?;
        require_initializing(&inner, "enter/leave hooks")?;
        inner
            .dispatcher
            .mask()
            .check_mutation(MutationKind::EnterLeaveHooks)?;
        inner.hooks.install(hooks);
        Ok(())
    }

    /// Install the function-id mapper consulted before probing a function
    pub fn set_function_id_mapper(&self, mapper: FunctionIdMapper) -> BrokerResult<()> {
        let inner = self.live()?;
        require_initializing(&inner, "a function id mapper")?;
        inner
            .dispatcher
            .mask()
            .check_mutation(MutationKind::EnterLeaveHooks)?;
        inner.hooks.set_mapper(mapper);
        Ok(())
    }

    pub fn request_instrumented_thread(&self) -> BrokerResult<ThreadId> {
        let inner = self.live()?;
        inner
            .dispatcher
            .mask()
            .check_mutation(MutationKind::InstrumentThread)?;
        inner.services.control()?.request_instrumented_thread()
    }

    // =========================================================================
    // Recompilation
    // =========================================================================

    /// Request a new revision for each `(modules[i], tokens[i])`
    ///
    /// Per-method failures are reported in the batch; the call itself only
    /// fails when recompilation is unavailable or the arrays are malformed.
    pub fn request_rejit(
        &self,
        modules: &[ModuleId],
        tokens: &[MdToken],
        flags: RejitFlags,
    ) -> BrokerResult<BatchStatus<ReJitId>> {
        let inner = self.live()?;
        let methods = rejit_batch(&inner, modules, tokens)?;

        let span = span_operation("request_rejit");
        let _entered = span.enter();
        let batch = request_each(&inner, &methods, flags);
        span.record_items_processed(methods.len());
        span.record_result(batch.all_succeeded());
        Ok(batch)
    }

    /// Request revisions for the given methods and every method known to
    /// have inlined one of them
    pub fn request_rejit_with_inliners(
        &self,
        flags: RejitFlags,
        modules: &[ModuleId],
        tokens: &[MdToken],
    ) -> BrokerResult<RejitWithInliners> {
        let inner = self.live()?;
        let methods = rejit_batch(&inner, modules, tokens)?;

        let span = span_operation("request_rejit_with_inliners");
        let _entered = span.enter();

        let requested = request_each(&inner, &methods, flags);

        let targets: HashSet<MethodKey> = methods.iter().copied().collect();
        let mut callers: HashSet<MethodKey> = HashSet::default();
        let mut incomplete = false;
        for (method, outcome) in methods.iter().zip(requested.iter()) {
            if outcome.is_err() {
                continue;
            }
            let found = inner.rejit.inlining().enumerate(*method);
            incomplete |= found.incomplete;
            callers.extend(found.methods.into_iter().filter(|m| !targets.contains(m)));
        }

        let mut inliner_methods: Vec<MethodKey> = callers.into_iter().collect();
        inliner_methods.sort_unstable();
        let inliners = request_each(&inner, &inliner_methods, flags);

        if incomplete {
            warn!(
                methods = methods.len(),
                "inliner set may be incomplete; some modules carry no inlining records"
            );
        }
        span.record_items_processed(methods.len() + inliner_methods.len());
        span.record_result(requested.all_succeeded() && inliners.all_succeeded());

        Ok(RejitWithInliners {
            requested,
            inliner_methods,
            inliners,
            incomplete,
        })
    }

    /// Revert each method to its original code; entries count revisions reverted
    pub fn request_revert(
        &self,
        modules: &[ModuleId],
        tokens: &[MdToken],
    ) -> BrokerResult<BatchStatus<usize>> {
        let inner = self.live()?;
        let methods = rejit_batch(&inner, modules, tokens)?;
        Ok(methods
            .iter()
            .map(|method| inner.rejit.revert(*method))
            .collect())
    }

    /// Revisions resident for a function, excluding the original code
    pub fn rejit_ids(&self, function: FunctionId) -> BrokerResult<Vec<ReJitId>> {
        let inner = self.live()?;
        Ok(inner
            .code
            .revisions(function)
            .into_iter()
            .filter(|rejit| !rejit.is_original())
            .collect())
    }

    pub fn enumerate_inliners(
        &self,
        module: ModuleId,
        token: MdToken,
    ) -> BrokerResult<InlinerEnumeration> {
        let inner = self.live()?;
        Ok(inner
            .rejit
            .inlining()
            .enumerate(MethodKey::new(module, token)))
    }

    pub fn rejit_state(&self, rejit: ReJitId) -> BrokerResult<RejitState> {
        self.live()?
            .rejit
            .state(rejit)
            .ok_or_else(|| BrokerError::NotFound(format!("revision {}", rejit)))
    }

    pub fn revision_info(&self, rejit: ReJitId) -> BrokerResult<RevisionInfo> {
        self.live()?
            .rejit
            .info(rejit)
            .ok_or_else(|| BrokerError::NotFound(format!("revision {}", rejit)))
    }

    // =========================================================================
    // Stack snapshots
    // =========================================================================

    /// Walk a thread's managed and unmanaged frames, innermost first
    ///
    /// `thread` defaults to the calling thread. Frames are only valid inside
    /// `callback`.
    pub fn do_stack_snapshot<F>(
        &self,
        thread: Option<ThreadId>,
        flags: WalkFlags,
        seed_context: Option<&[u8]>,
        callback: F,
    ) -> BrokerResult<WalkOutcome>
    where
        F: FnMut(&FrameInfo<'_>) -> WalkControl,
    {
        let inner = self.live()?;
        if !inner.dispatcher.is_enabled(EventCategory::StackSnapshot) {
            return Err(BrokerError::not_available(
                "stack snapshots require ENABLE_STACK_SNAPSHOT",
            ));
        }
        let threads = inner.services.threads()?;

        let stats = inner.dispatcher.stats();
        stats.inc_walks();
        let outcome = inner
            .walker
            .walk(threads, &inner.code, thread, flags, seed_context, callback);
        if let Err(e) = &outcome {
            stats.inc_walk_failures();
            debug!(error = %e, "stack snapshot failed");
        }
        outcome
    }

    // =========================================================================
    // Environment
    // =========================================================================

    pub fn environment_variable(&self, name: &str) -> BrokerResult<Option<String>> {
        self.live()?.services.environment.get(name)
    }

    pub fn set_environment_variable(&self, name: &str, value: Option<&str>) -> BrokerResult<()> {
        self.live()?.services.environment.set(name, value)
    }

    // =========================================================================
    // Detach
    // =========================================================================

    /// Ask to be detached
    ///
    /// Every category is disabled immediately; `profiler_detach_succeeded`
    /// follows once the engine confirms nothing can still call the observer.
    pub fn request_detach(&self, expected_completion: Duration) -> BrokerResult<()> {
        let inner = self.live()?;
        let supports_detach = inner
            .dispatcher
            .observer()
            .is_some_and(|set| set.v3().is_some());
        if !supports_detach {
            return Err(BrokerError::not_available(
                "detach requires an observer implementing ProfilerCallback3",
            ));
        }
        inner.lifecycle.request_detach(expected_completion)?;
        inner.dispatcher.mask().clear();
        info!(
            session = %self.session,
            expected_ms = expected_completion.as_millis() as u64,
            "detach requested"
        );
        Ok(())
    }
}

impl fmt::Debug for ProfilerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilerInfo")
            .field("session", &self.session)
            .field("live", &self.live().is_ok())
            .finish()
    }
}

fn require_initializing(inner: &BrokerInner, what: &str) -> BrokerResult<()> {
    if inner.lifecycle.state() != LifecycleState::Initializing {
        return Err(BrokerError::invalid_state(format!(
            "{} can only be installed during initialize",
            what
        )));
    }
    Ok(())
}

/// Pick the revision an IL map query refers to
fn resolve_revision(
    inner: &BrokerInner,
    function: FunctionId,
    rejit: Option<ReJitId>,
) -> BrokerResult<ReJitId> {
    if let Some(rejit) = rejit {
        return Ok(rejit);
    }
    match inner.code.revisions(function).as_slice() {
        [] => Ok(ReJitId::ORIGINAL),
        [only] => Ok(*only),
        _ => Err(BrokerError::AmbiguousRevision(function.0)),
    }
}

/// Validate a recompilation batch and zip it into method keys
fn rejit_batch(
    inner: &BrokerInner,
    modules: &[ModuleId],
    tokens: &[MdToken],
) -> BrokerResult<Vec<MethodKey>> {
    let mask = inner.dispatcher.mask();
    if mask.observer_kind() == ObserverKind::NotificationOnly {
        return Err(BrokerError::not_available(
            "recompilation is not available to notification-only observers",
        ));
    }
    if !mask.get().low.contains(MonitorFlags::ENABLE_REJIT) {
        return Err(BrokerError::RejitNotEnabled);
    }
    if modules.len() != tokens.len() {
        return Err(BrokerError::invalid_argument(format!(
            "{} modules but {} tokens",
            modules.len(),
            tokens.len()
        )));
    }
    if modules.is_empty() || modules.len() > MAX_REJIT_BATCH {
        return Err(BrokerError::invalid_argument(format!(
            "batch of {} methods is outside 1..={}",
            modules.len(),
            MAX_REJIT_BATCH
        )));
    }
    Ok(modules
        .iter()
        .zip(tokens)
        .map(|(module, token)| MethodKey::new(*module, *token))
        .collect())
}

fn request_each(
    inner: &BrokerInner,
    methods: &[MethodKey],
    flags: RejitFlags,
) -> BatchStatus<ReJitId> {
    let batch: BatchStatus<ReJitId> = methods
        .iter()
        .map(|method| inner.rejit.request(*method, flags))
        .collect();
    inner
        .dispatcher
        .stats()
        .add_rejit_requests(methods.len() as u64);
    batch
}
