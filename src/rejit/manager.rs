/*!
 * ReJIT State Machine
 *
 * Tracks every (method, revision) pair from request to activation or revert.
 * Parameter supply is exclusive per method; different methods proceed
 * fully in parallel.
 */

use super::control::FunctionControl;
use super::inlining::InlineTracker;
use super::types::{RejitFlags, RejitParameters, RejitState, RevisionInfo};
use crate::core::errors::{BrokerError, CallbackError, CallbackResult};
use crate::core::guards::OnDrop;
use crate::core::id::{rejit_id_generator, AtomicGenerator, IdGenerator};
use crate::core::types::{BrokerResult, FunctionId, MethodKey, ReJitId, StatusCode};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

struct Revision {
    id: ReJitId,
    flags: RejitFlags,
    state: RejitState,
    history: Vec<RejitState>,
    params: Option<Arc<RejitParameters>>,
    functions: Vec<FunctionId>,
    /// Instantiations currently being compiled under this revision
    compiling: usize,
}

impl Revision {
    fn info(&self, method: MethodKey) -> RevisionInfo {
        RevisionInfo {
            rejit: self.id,
            method,
            flags: self.flags,
            state: self.state,
            history: self.history.clone(),
            functions: self.functions.clone(),
        }
    }
}

#[derive(Default)]
struct MethodRevisions {
    revisions: Vec<Revision>,
    /// Thread currently running the parameter-supply callback for this method
    supplier: Option<ThreadId>,
}

#[derive(Default)]
struct MethodSlot {
    state: Mutex<MethodRevisions>,
    supplied: Condvar,
}

/// Result of a parameter-supply attempt
#[derive(Debug)]
pub enum SupplyOutcome {
    /// The observer supplied parameters for this revision
    Supplied,
    /// Parameters were supplied earlier
    AlreadySupplied,
    /// The revision was reverted or errored; nothing to supply
    Skipped,
    /// The observer's callback failed; the revision is now `Errored`
    Failed(CallbackError),
}

/// Result of a finished compilation
#[derive(Debug)]
pub enum CompileOutcome {
    /// Compiled code should be made reachable
    Activated {
        method: MethodKey,
        params: Arc<RejitParameters>,
    },
    /// Compilation failed; the revision is `Errored` unless already active
    Failed { method: MethodKey, status: StatusCode },
    /// The revision was reverted while compiling; the code must be discarded
    Discarded { method: MethodKey },
}

/// Recompilation request tracker
pub struct RejitManager {
    methods: DashMap<MethodKey, Arc<MethodSlot>, RandomState>,
    by_id: DashMap<ReJitId, MethodKey, RandomState>,
    ids: AtomicGenerator<ReJitId>,
    inlining: InlineTracker,
    compiling: AtomicUsize,
    record_history: bool,
}

impl RejitManager {
    pub fn new(record_history: bool) -> Self {
        Self {
            methods: DashMap::with_hasher(RandomState::new()),
            by_id: DashMap::with_hasher(RandomState::new()),
            ids: rejit_id_generator(),
            inlining: InlineTracker::new(),
            compiling: AtomicUsize::new(0),
            record_history,
        }
    }

    pub fn inlining(&self) -> &InlineTracker {
        &self.inlining
    }

    /// Compilations between start and finish, across all methods
    pub fn active_compilations(&self) -> usize {
        self.compiling.load(Ordering::Acquire)
    }

    /// Queue a new revision of `method`
    pub fn request(&self, method: MethodKey, flags: RejitFlags) -> BrokerResult<ReJitId> {
        if method.token.0 == 0 {
            return Err(BrokerError::invalid_argument(format!(
                "method {} has a nil token",
                method
            )));
        }

        let id = self.ids.next();
        let slot = Arc::clone(self.methods.entry(method).or_default().value());
        slot.state.lock().revisions.push(Revision {
            id,
            flags,
            state: RejitState::Requested,
            history: if self.record_history {
                vec![RejitState::Requested]
            } else {
                Vec::new()
            },
            params: None,
            functions: Vec::new(),
            compiling: 0,
        });
        self.by_id.insert(id, method);

        info!(method = %method, rejit = %id, ?flags, "recompilation requested");
        Ok(id)
    }

    /// Revert every live revision of `method`; returns how many were reverted
    pub fn revert(&self, method: MethodKey) -> BrokerResult<usize> {
        let slot = self
            .methods
            .get(&method)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BrokerError::NotFound(format!("no revisions for method {}", method)))?;

        let mut guard = slot.state.lock();
        let mut reverted = 0;
        for revision in guard.revisions.iter_mut().filter(|r| !r.state.is_terminal()) {
            advance(revision, RejitState::Reverted, self.record_history)?;
            reverted += 1;
        }
        drop(guard);

        if reverted == 0 {
            return Err(BrokerError::NotFound(format!(
                "no live revisions for method {}",
                method
            )));
        }
        info!(method = %method, reverted, "revisions reverted");
        Ok(reverted)
    }

    /// Run the observer's parameter-supply callback for one revision
    ///
    /// At most one thread supplies parameters for a given method at a time;
    /// others wait. Re-entering on the supplying thread is an ordering error.
    pub fn supply_parameters<F>(&self, id: ReJitId, supply: F) -> BrokerResult<SupplyOutcome>
    where
        F: FnOnce(&FunctionControl) -> CallbackResult,
    {
        let (method, slot) = self.slot_for(id)?;
        let me = thread::current().id();
        let record = self.record_history;

        {
            let mut guard = slot.state.lock();
            loop {
                let supplier = guard.supplier;
                match supplier {
                    Some(owner) if owner == me => {
                        return Err(BrokerError::invalid_state(format!(
                            "parameter supply re-entered for method {}",
                            method
                        )));
                    }
                    Some(_) => {
                        slot.supplied.wait(&mut guard);
                        continue;
                    }
                    None => {}
                }

                let revision = find_mut(&mut guard.revisions, id)?;
                match revision.state {
                    RejitState::Requested => {
                        advance(revision, RejitState::ParametersPending, record)?;
                        guard.supplier = Some(me);
                        break;
                    }
                    state if state.is_terminal() => return Ok(SupplyOutcome::Skipped),
                    _ => return Ok(SupplyOutcome::AlreadySupplied),
                }
            }
        }

        // Releases the claim even if the observer unwinds
        let release = OnDrop::new("rejit_parameters", || {
            let mut guard = slot.state.lock();
            if guard.supplier == Some(me) {
                guard.supplier = None;
                if let Ok(revision) = find_mut(&mut guard.revisions, id) {
                    if revision.state == RejitState::ParametersPending {
                        let _ = advance(revision, RejitState::Errored(StatusCode::FAIL), record);
                    }
                }
            }
            slot.supplied.notify_all();
        });

        let control = FunctionControl::new(method, id);
        let result = supply(&control);
        let params = control.seal();

        let outcome = {
            let mut guard = slot.state.lock();
            guard.supplier = None;
            let revision = find_mut(&mut guard.revisions, id)?;
            if revision.state != RejitState::ParametersPending {
                SupplyOutcome::Skipped
            } else {
                match result {
                    Ok(()) => {
                        revision.params = Some(Arc::new(params));
                        advance(revision, RejitState::ParametersSupplied, record)?;
                        SupplyOutcome::Supplied
                    }
                    Err(err) => {
                        advance(revision, RejitState::Errored(err.status), record)?;
                        SupplyOutcome::Failed(err)
                    }
                }
            }
        };
        drop(release);

        debug!(method = %method, rejit = %id, ?outcome, "parameter supply finished");
        Ok(outcome)
    }

    /// Bracket start: one instantiation of the revision begins compiling
    pub fn begin_compilation(&self, id: ReJitId, function: FunctionId) -> BrokerResult<MethodKey> {
        let (method, slot) = self.slot_for(id)?;
        let mut guard = slot.state.lock();
        let revision = find_mut(&mut guard.revisions, id)?;

        match revision.state {
            RejitState::ParametersSupplied => {
                advance(revision, RejitState::CompilationStarted, self.record_history)?;
            }
            // Another instantiation of an already active revision
            RejitState::Active => {}
            state => {
                return Err(BrokerError::invalid_state(format!(
                    "revision {} cannot start compiling in state {:?}",
                    id, state
                )));
            }
        }

        if !revision.functions.contains(&function) {
            revision.functions.push(function);
        }
        revision.compiling += 1;
        self.compiling.fetch_add(1, Ordering::AcqRel);
        Ok(method)
    }

    /// Bracket end: the compilation started by `begin_compilation` finished
    pub fn finish_compilation(
        &self,
        id: ReJitId,
        function: FunctionId,
        status: StatusCode,
    ) -> BrokerResult<CompileOutcome> {
        let (method, slot) = self.slot_for(id)?;
        let mut guard = slot.state.lock();
        let revision = find_mut(&mut guard.revisions, id)?;

        if revision.compiling == 0 || !revision.functions.contains(&function) {
            return Err(BrokerError::invalid_state(format!(
                "function {} is not compiling revision {}",
                function, id
            )));
        }
        revision.compiling -= 1;
        self.compiling.fetch_sub(1, Ordering::AcqRel);

        let record = self.record_history;
        let outcome = match revision.state {
            RejitState::CompilationStarted => {
                advance(revision, RejitState::CompilationFinished(status), record)?;
                if status.is_success() {
                    advance(revision, RejitState::Active, record)?;
                    CompileOutcome::Activated {
                        method,
                        params: revision.params.clone().unwrap_or_default(),
                    }
                } else {
                    advance(revision, RejitState::Errored(status), record)?;
                    CompileOutcome::Failed { method, status }
                }
            }
            RejitState::Active if status.is_success() => CompileOutcome::Activated {
                method,
                params: revision.params.clone().unwrap_or_default(),
            },
            RejitState::Active => CompileOutcome::Failed { method, status },
            _ => CompileOutcome::Discarded { method },
        };

        if let CompileOutcome::Failed { .. } = outcome {
            warn!(method = %method, rejit = %id, %status, "recompilation failed");
        }
        Ok(outcome)
    }

    /// Move a revision to `Errored` outside of a compilation bracket
    pub fn fail(&self, id: ReJitId, status: StatusCode) -> BrokerResult<MethodKey> {
        let (method, slot) = self.slot_for(id)?;
        let mut guard = slot.state.lock();
        let revision = find_mut(&mut guard.revisions, id)?;
        advance(revision, RejitState::Errored(status), self.record_history)?;
        Ok(method)
    }

    pub fn state(&self, id: ReJitId) -> Option<RejitState> {
        self.info(id).map(|info| info.state)
    }

    pub fn info(&self, id: ReJitId) -> Option<RevisionInfo> {
        let (method, slot) = self.slot_for(id).ok()?;
        let guard = slot.state.lock();
        guard
            .revisions
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.info(method))
    }

    /// All revisions of a method, oldest first
    pub fn revisions(&self, method: MethodKey) -> Vec<RevisionInfo> {
        self.methods
            .get(&method)
            .map(|slot| {
                slot.state
                    .lock()
                    .revisions
                    .iter()
                    .map(|r| r.info(method))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Revisions of a method that still need compiling, oldest first
    pub fn pending(&self, method: MethodKey) -> Vec<ReJitId> {
        self.revisions(method)
            .into_iter()
            .filter(|r| {
                matches!(
                    r.state,
                    RejitState::Requested
                        | RejitState::ParametersPending
                        | RejitState::ParametersSupplied
                )
            })
            .map(|r| r.rejit)
            .collect()
    }

    pub fn parameters(&self, id: ReJitId) -> Option<Arc<RejitParameters>> {
        let (_, slot) = self.slot_for(id).ok()?;
        let guard = slot.state.lock();
        guard
            .revisions
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.params.clone())
    }

    /// Union of the request flags of every live revision of `method`
    pub fn live_flags(&self, method: MethodKey) -> RejitFlags {
        self.methods
            .get(&method)
            .map(|slot| {
                slot.state
                    .lock()
                    .revisions
                    .iter()
                    .filter(|r| !r.state.is_terminal())
                    .fold(RejitFlags::empty(), |acc, r| acc | r.flags)
            })
            .unwrap_or_else(RejitFlags::empty)
    }

    fn slot_for(&self, id: ReJitId) -> BrokerResult<(MethodKey, Arc<MethodSlot>)> {
        let method = self
            .by_id
            .get(&id)
            .map(|entry| *entry.value())
            .ok_or_else(|| BrokerError::NotFound(format!("revision {}", id)))?;
        let slot = self
            .methods
            .get(&method)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BrokerError::NotFound(format!("revision {}", id)))?;
        Ok((method, slot))
    }

    pub(crate) fn clear(&self) {
        self.methods.clear();
        self.by_id.clear();
        self.inlining.clear();
        self.compiling.store(0, Ordering::Release);
    }
}

fn find_mut(revisions: &mut [Revision], id: ReJitId) -> BrokerResult<&mut Revision> {
    revisions
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| BrokerError::NotFound(format!("revision {}", id)))
}

fn advance(revision: &mut Revision, next: RejitState, record: bool) -> BrokerResult<()> {
    if !revision.state.can_transition_to(next) {
        return Err(BrokerError::invalid_state(format!(
            "revision {} cannot move from {:?} to {:?}",
            revision.id, revision.state, next
        )));
    }
    debug!(rejit = %revision.id, from = ?revision.state, to = ?next, "revision state change");
    revision.state = next;
    if record {
        revision.history.push(next);
    }
    Ok(())
}
