/*!
 * Object Identity Tracker
 *
 * Maps live object identities to addresses across a moving collector.
 * Drives the per-cycle phase machine and applies moved/survived reports
 * at collection finish, bumping the epoch so stale references are detected.
 */

use super::batch::{MovedRangeBatch, SurvivedRangeBatch};
use super::types::{
    GcCycleSummary, GcPhase, GcReason, Generation, GenerationSet, ManagedObjectRef, ObjectId,
    RootReference, SuspendReason, TrackedObject,
};
use crate::core::errors::BrokerError;
use crate::core::limits::ROOT_DEDUP_INITIAL_CAPACITY;
use crate::core::types::{Address, BrokerResult, ClassId, GcHandleId, Size};
use crate::monitoring::{span_operation, OperationSpan};
use ahash::{HashSet, HashSetExt, RandomState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Data accumulated between collection start and finish
struct CycleData {
    cycle: u64,
    generations: GenerationSet,
    reason: GcReason,
    moved: Vec<(Address, Address, Size)>,
    survived: Vec<(Address, Size)>,
    roots: HashSet<RootReference>,
    finalizer_queued: usize,
    span: OperationSpan,
}

struct PhaseState {
    phase: GcPhase,
    suspend_reason: Option<SuspendReason>,
    cycle: Option<CycleData>,
}

/// Relocations applied by the most recent collection
#[derive(Default)]
struct RelocationLog {
    /// Epoch that references must carry to be remapped through this log
    from_epoch: Option<u32>,
    /// Sorted by old start
    moved: Vec<(Address, Address, Size)>,
    /// Sorted by start
    survived: Vec<(Address, Size)>,
    reclaimed: HashSet<Address>,
}

impl RelocationLog {
    fn moved_to(&self, addr: Address) -> Option<Address> {
        relocate(&self.moved, addr)
    }

    fn survived(&self, addr: Address) -> bool {
        within(&self.survived, addr)
    }
}

/// Object identity tracker
///
/// # Performance
/// - Epoch and collection flag are atomics: resolving a reference never locks
/// - The object table is written only during allocation and at collection finish
pub struct ObjectTracker {
    state: Mutex<PhaseState>,
    objects: RwLock<BTreeMap<Address, TrackedObject>>,
    epoch: AtomicU32,
    collecting: AtomicBool,
    log: RwLock<RelocationLog>,
    handles: DashMap<GcHandleId, Option<ObjectId>, RandomState>,
    cycles: AtomicU64,
}

impl ObjectTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PhaseState {
                phase: GcPhase::Idle,
                suspend_reason: None,
                cycle: None,
            }),
            objects: RwLock::new(BTreeMap::new()),
            epoch: AtomicU32::new(0),
            collecting: AtomicBool::new(false),
            log: RwLock::new(RelocationLog::default()),
            handles: DashMap::with_hasher(RandomState::new()),
            cycles: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Phase machine
    // =========================================================================

    pub fn phase(&self) -> GcPhase {
        self.state.lock().phase
    }

    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    #[inline]
    pub fn in_collection(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    pub fn suspend_reason(&self) -> Option<SuspendReason> {
        self.state.lock().suspend_reason
    }

    pub fn suspend_requested(&self, reason: SuspendReason) -> BrokerResult<()> {
        let mut state = self.state.lock();
        expect_phase(state.phase, &[GcPhase::Idle], "runtime_suspend_started")?;
        state.phase = GcPhase::SuspendRequested;
        state.suspend_reason = Some(reason);
        debug!(?reason, "runtime suspend requested");
        Ok(())
    }

    pub fn suspend_completed(&self) -> BrokerResult<()> {
        let mut state = self.state.lock();
        expect_phase(
            state.phase,
            &[GcPhase::SuspendRequested],
            "runtime_suspend_finished",
        )?;
        state.phase = GcPhase::Suspended;
        Ok(())
    }

    /// Suspension could not complete; no collection occurred
    pub fn suspend_aborted(&self) -> BrokerResult<()> {
        let mut state = self.state.lock();
        expect_phase(
            state.phase,
            &[GcPhase::SuspendRequested],
            "runtime_suspend_aborted",
        )?;
        state.phase = GcPhase::Idle;
        state.suspend_reason = None;
        debug!("runtime suspend aborted");
        Ok(())
    }

    pub fn collection_started(
        &self,
        generations: GenerationSet,
        reason: GcReason,
    ) -> BrokerResult<u64> {
        if generations.is_empty() {
            return Err(BrokerError::invalid_argument(
                "a collection must collect at least one generation",
            ));
        }

        let mut state = self.state.lock();
        expect_phase(
            state.phase,
            &[GcPhase::Suspended],
            "garbage_collection_started",
        )?;

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let span = span_operation("gc_cycle");
        state.cycle = Some(CycleData {
            cycle,
            generations,
            reason,
            moved: Vec::new(),
            survived: Vec::new(),
            roots: HashSet::with_capacity(ROOT_DEDUP_INITIAL_CAPACITY),
            finalizer_queued: 0,
            span,
        });
        state.phase = GcPhase::CollectionStarted;
        self.collecting.store(true, Ordering::Release);

        info!(cycle, ?generations, ?reason, "collection started");
        Ok(cycle)
    }

    /// Record relocated ranges reported by the collector
    pub fn record_moved(&self, batch: &MovedRangeBatch) -> BrokerResult<()> {
        let mut state = self.state.lock();
        let cycle = current_cycle(&mut state, "moved_references")?;
        cycle.moved.extend(batch.iter());
        Ok(())
    }

    /// Record ranges that survived in place
    pub fn record_survived(&self, batch: &SurvivedRangeBatch) -> BrokerResult<()> {
        let mut state = self.state.lock();
        let cycle = current_cycle(&mut state, "surviving_references")?;
        cycle.survived.extend(batch.iter());
        Ok(())
    }

    /// Filter out roots already reported this cycle
    pub fn dedup_roots(&self, roots: &[RootReference]) -> BrokerResult<Vec<RootReference>> {
        let mut state = self.state.lock();
        let cycle = current_cycle(&mut state, "root_references")?;
        Ok(roots
            .iter()
            .filter(|root| cycle.roots.insert(**root))
            .copied()
            .collect())
    }

    /// Count an object placed on the finalizer queue
    pub fn finalizer_queued(&self, object: ObjectId) -> BrokerResult<ManagedObjectRef> {
        let mut state = self.state.lock();
        let cycle = current_cycle(&mut state, "finalizeable_object_queued")?;
        cycle.finalizer_queued += 1;
        Ok(ManagedObjectRef::new(object, self.epoch()))
    }

    /// Apply the cycle's reports to the object table and bump the epoch
    pub fn collection_finished(&self) -> BrokerResult<GcCycleSummary> {
        let mut state = self.state.lock();
        expect_phase(
            state.phase,
            &[GcPhase::CollectionStarted],
            "garbage_collection_finished",
        )?;
        let data = state
            .cycle
            .take()
            .ok_or_else(|| BrokerError::invalid_state("collection data missing"))?;

        let mut moved = data.moved;
        moved.sort_unstable_by_key(|range| range.0);
        let mut survived = data.survived;
        survived.sort_unstable_by_key(|range| range.0);

        let mut summary = GcCycleSummary {
            cycle: data.cycle,
            generations: data.generations,
            reason: data.reason,
            epoch: 0,
            moved_ranges: moved.len(),
            moved_objects: 0,
            survived_objects: 0,
            promoted_objects: 0,
            reclaimed_objects: 0,
            roots_reported: data.roots.len(),
        };
        let mut reclaimed = HashSet::new();

        {
            let mut objects = self.objects.write();
            let previous = std::mem::take(&mut *objects);
            for (addr, mut object) in previous {
                let collected = data.generations.collects(object.generation);
                let target = if let Some(new_addr) = relocate(&moved, addr) {
                    summary.moved_objects += 1;
                    Some(new_addr)
                } else if within(&survived, addr) {
                    summary.survived_objects += 1;
                    Some(addr)
                } else if collected {
                    None
                } else {
                    // Untouched: older generation outside this collection
                    objects.insert(addr, object);
                    continue;
                };

                match target {
                    Some(new_addr) => {
                        if collected {
                            let promoted = object.generation.promoted();
                            if promoted != object.generation {
                                summary.promoted_objects += 1;
                                object.generation = promoted;
                            }
                        }
                        if objects.insert(new_addr, object).is_some() {
                            warn!(address = new_addr, "two objects relocated to one address");
                        }
                    }
                    None => {
                        summary.reclaimed_objects += 1;
                        reclaimed.insert(addr);
                    }
                }
            }
        }

        // Handles follow their targets
        for mut entry in self.handles.iter_mut() {
            if let Some(target) = *entry.value() {
                let addr = target.address();
                if let Some(new_addr) = relocate(&moved, addr) {
                    *entry.value_mut() = Some(ObjectId(new_addr));
                } else if reclaimed.contains(&addr) {
                    *entry.value_mut() = None;
                }
            }
        }

        let from_epoch = self.epoch();
        let epoch = from_epoch.wrapping_add(1);
        *self.log.write() = RelocationLog {
            from_epoch: Some(from_epoch),
            moved,
            survived,
            reclaimed,
        };
        self.epoch.store(epoch, Ordering::Release);
        self.collecting.store(false, Ordering::Release);
        state.phase = GcPhase::CollectionFinished;
        summary.epoch = epoch;

        data.span.record_items_processed(summary.moved_ranges);
        data.span.record_result(true);
        info!(
            cycle = summary.cycle,
            epoch,
            moved = summary.moved_objects,
            survived = summary.survived_objects,
            reclaimed = summary.reclaimed_objects,
            finalizer_queued = data.finalizer_queued,
            "collection finished"
        );
        Ok(summary)
    }

    pub fn resume_started(&self) -> BrokerResult<()> {
        let mut state = self.state.lock();
        expect_phase(
            state.phase,
            &[GcPhase::Suspended, GcPhase::CollectionFinished],
            "runtime_resume_started",
        )?;
        state.phase = GcPhase::ResumeStarted;
        Ok(())
    }

    pub fn resume_finished(&self) -> BrokerResult<()> {
        let mut state = self.state.lock();
        expect_phase(
            state.phase,
            &[GcPhase::ResumeStarted],
            "runtime_resume_finished",
        )?;
        state.phase = GcPhase::Idle;
        state.suspend_reason = None;
        Ok(())
    }

    // =========================================================================
    // Object table
    // =========================================================================

    /// Register a newly allocated object and return its current-epoch reference
    pub fn register(
        &self,
        object: ObjectId,
        class: ClassId,
        size: Size,
        generation: Generation,
    ) -> BrokerResult<ManagedObjectRef> {
        if self.in_collection() {
            return Err(BrokerError::CollectionInProgress);
        }
        if size == 0 {
            return Err(BrokerError::invalid_argument("object size must be non-zero"));
        }
        let addr = object.address();
        let end = addr
            .checked_add(size)
            .ok_or_else(|| BrokerError::invalid_argument("object overflows the address space"))?;

        let mut objects = self.objects.write();
        let overlaps_prev = objects
            .range(..=addr)
            .next_back()
            .is_some_and(|(start, live)| start + live.size > addr);
        let overlaps_next = objects
            .range(addr..)
            .next()
            .is_some_and(|(start, _)| *start < end);
        if overlaps_prev || overlaps_next {
            return Err(BrokerError::invalid_argument(format!(
                "object {} overlaps a live object",
                object
            )));
        }

        objects.insert(
            addr,
            TrackedObject {
                class,
                size,
                generation,
            },
        );
        Ok(ManagedObjectRef::new(object, self.epoch()))
    }

    /// Current-epoch reference for an address reported by the engine
    #[inline]
    pub fn current_ref(&self, object: ObjectId) -> ManagedObjectRef {
        ManagedObjectRef::new(object, self.epoch())
    }

    /// Validate a reference against the current epoch
    pub fn resolve(&self, object: ManagedObjectRef) -> BrokerResult<ObjectId> {
        if self.in_collection() {
            return Err(BrokerError::CollectionInProgress);
        }
        if object.epoch != self.epoch() {
            return Err(BrokerError::StaleObjectRef(object.id.address()));
        }
        Ok(object.id)
    }

    /// Broker record of a live object
    pub fn object_info(&self, object: ManagedObjectRef) -> BrokerResult<TrackedObject> {
        let id = self.resolve(object)?;
        self.objects
            .read()
            .get(&id.address())
            .copied()
            .ok_or_else(|| BrokerError::NotFound(format!("object {}", id)))
    }

    /// Translate a reference from the previous epoch through the last cycle
    pub fn remap(&self, object: ManagedObjectRef) -> BrokerResult<ManagedObjectRef> {
        if self.in_collection() {
            return Err(BrokerError::CollectionInProgress);
        }
        let epoch = self.epoch();
        if object.epoch == epoch {
            return Ok(object);
        }

        let addr = object.id.address();
        let log = self.log.read();
        if log.from_epoch != Some(object.epoch) {
            return Err(BrokerError::StaleObjectRef(addr));
        }

        if let Some(new_addr) = log.moved_to(addr) {
            return Ok(ManagedObjectRef::new(ObjectId(new_addr), epoch));
        }
        if log.reclaimed.contains(&addr) {
            return Err(BrokerError::ObjectReclaimed(addr));
        }
        if log.survived(addr) || self.objects.read().contains_key(&addr) {
            return Ok(ManagedObjectRef::new(object.id, epoch));
        }
        Err(BrokerError::ObjectReclaimed(addr))
    }

    pub fn live_objects(&self) -> usize {
        self.objects.read().len()
    }

    // =========================================================================
    // GC handles
    // =========================================================================

    pub fn handle_created(&self, handle: GcHandleId, target: Option<ObjectId>) -> BrokerResult<()> {
        match self.handles.entry(handle) {
            Entry::Occupied(_) => Err(BrokerError::invalid_argument(format!(
                "handle {} already exists",
                handle
            ))),
            Entry::Vacant(slot) => {
                slot.insert(target);
                Ok(())
            }
        }
    }

    pub fn handle_destroyed(&self, handle: GcHandleId) -> BrokerResult<()> {
        self.handles
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| BrokerError::NotFound(format!("handle {}", handle)))
    }

    /// Current target of a handle, `None` once the target was reclaimed
    pub fn handle_target(&self, handle: GcHandleId) -> BrokerResult<Option<ManagedObjectRef>> {
        let target = self
            .handles
            .get(&handle)
            .map(|entry| *entry.value())
            .ok_or_else(|| BrokerError::NotFound(format!("handle {}", handle)))?;
        Ok(target.map(|id| self.current_ref(id)))
    }

    /// Drop all state (detach, teardown)
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.phase = GcPhase::Idle;
        state.suspend_reason = None;
        state.cycle = None;
        self.objects.write().clear();
        *self.log.write() = RelocationLog::default();
        self.handles.clear();
        self.collecting.store(false, Ordering::Release);
    }
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_phase(current: GcPhase, allowed: &[GcPhase], operation: &str) -> BrokerResult<()> {
    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(BrokerError::invalid_state(format!(
            "{} not allowed in phase {:?}",
            operation, current
        )))
    }
}

fn current_cycle<'a>(state: &'a mut PhaseState, operation: &str) -> BrokerResult<&'a mut CycleData> {
    expect_phase(state.phase, &[GcPhase::CollectionStarted], operation)?;
    state
        .cycle
        .as_mut()
        .ok_or_else(|| BrokerError::invalid_state("collection data missing"))
}

/// New address of `addr` if it lies in one of the sorted moved ranges
fn relocate(moved: &[(Address, Address, Size)], addr: Address) -> Option<Address> {
    let idx = moved.partition_point(|(old, _, _)| *old <= addr);
    let (old, new, len) = *moved.get(idx.checked_sub(1)?)?;
    (addr < old + len).then(|| new + (addr - old))
}

fn within(ranges: &[(Address, Size)], addr: Address) -> bool {
    let idx = ranges.partition_point(|(start, _)| *start <= addr);
    idx.checked_sub(1)
        .and_then(|i| ranges.get(i))
        .is_some_and(|(start, len)| addr < start + len)
}
