/*!
 * Collection Protocol Entry Points
 *
 * The engine reports suspension and collection phases here while it holds
 * every managed thread suspended. The tracker enforces ordering and records
 * the cycle before the observer sees anything, so identity bookkeeping is
 * correct even with every GC category disabled.
 */

use super::Broker;
use crate::core::errors::BrokerError;
use crate::core::types::{BrokerResult, GcHandleId};
use crate::dispatch::Dispatched;
use crate::mask::EventCategory;
use crate::objects::{
    FinalizerFlags, GcCycleSummary, GcReason, GenerationSet, MovedRangeBatch, ObjectId,
    RootReference, SuspendReason, SurvivedRangeBatch,
};
use tracing::debug;

impl Broker {
    pub fn runtime_suspend_started(&self, reason: SuspendReason) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.suspend_requested(reason)?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::Suspends,
            || (),
            |set, ()| set.v1().runtime_suspend_started(reason),
        ))
    }

    pub fn runtime_suspend_finished(&self) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.suspend_completed()?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::Suspends,
            || (),
            |set, ()| set.v1().runtime_suspend_finished(),
        ))
    }

    /// The requested suspension did not happen; no collection occurred
    pub fn runtime_suspend_aborted(&self) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.suspend_aborted()?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::Suspends,
            || (),
            |set, ()| set.v1().runtime_suspend_aborted(),
        ))
    }

    pub fn runtime_resume_started(&self) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.resume_started()?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::Suspends,
            || (),
            |set, ()| set.v1().runtime_resume_started(),
        ))
    }

    pub fn runtime_resume_finished(&self) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.resume_finished()?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::Suspends,
            || (),
            |set, ()| set.v1().runtime_resume_finished(),
        ))
    }

    /// Start of a cycle; returns its sequence number
    pub fn garbage_collection_started(
        &self,
        generations: GenerationSet,
        reason: GcReason,
    ) -> BrokerResult<u64> {
        let cycle = self.inner.objects.collection_started(generations, reason)?;
        self.inner.dispatcher.dispatch(
            EventCategory::GcLifecycle,
            || (),
            |set, ()| match set.v2() {
                Some(v2) => v2.garbage_collection_started(generations, reason),
                None => Ok(()),
            },
        );
        Ok(cycle)
    }

    /// Relocated ranges
    ///
    /// Observers implementing `ProfilerCallback4` receive the batch as is;
    /// older observers get the 32-bit shape, split where a range is too long.
    pub fn moved_references(&self, batch: &MovedRangeBatch) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.record_moved(batch)?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::GcMovedObjects,
            || (),
            |set, ()| match set.v4() {
                Some(v4) => v4.moved_references2(batch),
                None => set.v1().moved_references(&batch.to_narrow()),
            },
        ))
    }

    /// Ranges that survived without moving
    pub fn surviving_references(&self, batch: &SurvivedRangeBatch) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.record_survived(batch)?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::GcMovedObjects,
            || (),
            |set, ()| {
                if let Some(v4) = set.v4() {
                    v4.surviving_references2(batch)
                } else if let Some(v2) = set.v2() {
                    v2.surviving_references(&batch.to_narrow())
                } else {
                    Ok(())
                }
            },
        ))
    }

    /// Roots found by the collector; each root reaches the observer once per cycle
    pub fn root_references(&self, roots: &[RootReference]) -> BrokerResult<Dispatched<()>> {
        let fresh = self.inner.objects.dedup_roots(roots)?;
        if fresh.len() < roots.len() {
            debug!(
                reported = roots.len(),
                duplicates = roots.len() - fresh.len(),
                "duplicate roots dropped"
            );
        }
        if fresh.is_empty() {
            return Ok(Dispatched::Suppressed);
        }
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::GcRoots,
            || fresh,
            |set, fresh| match set.v2() {
                Some(v2) => v2.root_references2(&fresh),
                None => {
                    let ids: Vec<ObjectId> = fresh.iter().map(|root| root.object).collect();
                    set.v1().root_references(&ids)
                }
            },
        ))
    }

    pub fn finalizeable_object_queued(
        &self,
        flags: FinalizerFlags,
        object: ObjectId,
    ) -> BrokerResult<Dispatched<()>> {
        let reference = self.inner.objects.finalizer_queued(object)?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::GcRoots,
            || reference,
            |set, reference| match set.v2() {
                Some(v2) => v2.finalizeable_object_queued(flags, reference),
                None => Ok(()),
            },
        ))
    }

    pub fn conditional_weak_table_element_references(
        &self,
        keys: &[ObjectId],
        values: &[ObjectId],
    ) -> BrokerResult<Dispatched<()>> {
        if keys.len() != values.len() {
            return Err(BrokerError::invalid_argument(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        if !self.inner.objects.phase().accepts_heap_reports() {
            return Err(BrokerError::invalid_state(
                "weak table references are only reported during a collection",
            ));
        }
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::GcRoots,
            || (),
            |set, ()| match set.v5() {
                Some(v5) => v5.conditional_weak_table_element_references(keys, values),
                None => Ok(()),
            },
        ))
    }

    /// End of a cycle: relocations are applied and the epoch advances
    /// before the observer is told, so references it resolves from inside
    /// the callback are already the remapped ones.
    pub fn garbage_collection_finished(&self) -> BrokerResult<GcCycleSummary> {
        let summary = self.inner.objects.collection_finished()?;
        self.inner.dispatcher.stats().inc_gc_cycles();
        self.inner.dispatcher.dispatch(
            EventCategory::GcLifecycle,
            || (),
            |set, ()| match set.v2() {
                Some(v2) => v2.garbage_collection_finished(),
                None => Ok(()),
            },
        );
        Ok(summary)
    }

    pub fn handle_created(&self, handle: GcHandleId, target: Option<ObjectId>) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.handle_created(handle, target)?;
        let objects = &self.inner.objects;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::GcRoots,
            || target.map(|id| objects.current_ref(id)),
            |set, target| match set.v2() {
                Some(v2) => v2.handle_created(handle, target),
                None => Ok(()),
            },
        ))
    }

    pub fn handle_destroyed(&self, handle: GcHandleId) -> BrokerResult<Dispatched<()>> {
        self.inner.objects.handle_destroyed(handle)?;
        Ok(self.inner.dispatcher.dispatch(
            EventCategory::GcRoots,
            || (),
            |set, ()| match set.v2() {
                Some(v2) => v2.handle_destroyed(handle),
                None => Ok(()),
            },
        ))
    }
}
