/*!
 * Recompilation Tests
 * Revision lifecycle, batch validation, inliners and detach
 */

use crate::common::{broker_with, jit, method, FakeEngine, Recorder, Seen, UNTRACKED_MODULE};
use pretty_assertions::assert_eq;
use profiler_broker::callbacks::JitTarget;
use profiler_broker::code::CodeRange;
use profiler_broker::core::{BrokerError, FunctionId, MdToken, ModuleId, ReJitId, StatusCode};
use profiler_broker::mask::{MonitorFlags, ObserverKind};
use profiler_broker::rejit::{CompileOutcome, RejitFlags, RejitManager, RejitState};
use profiler_broker::{Broker, CallbackError, ProfilerInfo};
use proptest::prelude::*;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn rejit_observer(broker: &Broker) -> (Arc<Recorder>, ProfilerInfo) {
    let observer = Recorder::with_low(MonitorFlags::ENABLE_REJIT | MonitorFlags::JIT_COMPILATION);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();
    (observer, info)
}

fn request_one(info: &ProfilerInfo, token: u32, flags: RejitFlags) -> ReJitId {
    let m = method(token);
    let batch = info.request_rejit(&[m.module], &[m.token], flags).unwrap();
    batch.get(0).unwrap().clone().unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Request,
    Supply { fail: bool },
    Begin,
    Finish { ok: bool },
    Revert,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Request),
        any::<bool>().prop_map(|fail| Step::Supply { fail }),
        Just(Step::Begin),
        any::<bool>().prop_map(|ok| Step::Finish { ok }),
        Just(Step::Revert),
    ]
}

proptest! {
    /// Whatever the engine and observer do, a revision only moves forward
    #[test]
    fn revision_history_only_moves_forward(steps in prop::collection::vec(step(), 1..40)) {
        let manager = RejitManager::new(true);
        let m = method(3);
        let f = FunctionId(0x300);
        let mut ids = Vec::new();

        for step in steps {
            let last = ids.last().copied();
            match (step, last) {
                (Step::Request, _) => ids.push(manager.request(m, RejitFlags::empty()).unwrap()),
                (Step::Supply { fail }, Some(id)) => {
                    let _ = manager.supply_parameters(id, |_| {
                        if fail {
                            Err(CallbackError::failed("refused"))
                        } else {
                            Ok(())
                        }
                    });
                }
                (Step::Begin, Some(id)) => {
                    let _ = manager.begin_compilation(id, f);
                }
                (Step::Finish { ok }, Some(id)) => {
                    let status = if ok { StatusCode::OK } else { StatusCode::FAIL };
                    let _ = manager.finish_compilation(id, f, status);
                }
                (Step::Revert, Some(_)) => {
                    let _ = manager.revert(m);
                }
                (_, None) => {}
            }

            for revision in manager.revisions(m) {
                prop_assert_eq!(revision.history.first(), Some(&RejitState::Requested));
                prop_assert_eq!(revision.history.last(), Some(&revision.state));
                prop_assert!(revision
                    .history
                    .windows(2)
                    .all(|pair| pair[0].can_transition_to(pair[1])));
            }
        }
    }
}

#[test]
#[serial]
fn test_two_resident_revisions_need_disambiguation() {
    let broker = broker_with(&FakeEngine::new());
    let (_observer, info) = rejit_observer(&broker);
    let m = method(4);
    let f = FunctionId(0x400);
    jit(&broker, f, m, CodeRange::new(0x1_0000, 0x100));
    assert_eq!(info.code_regions(f, None).unwrap().len(), 1);

    let rejit = request_one(&info, 4, RejitFlags::empty());
    broker.begin_rejit_compilation(f, rejit, true).unwrap();
    broker
        .finish_rejit_compilation(f, rejit, CodeRange::new(0x3_0000, 0x40), StatusCode::OK, true)
        .unwrap();

    assert_eq!(
        info.code_regions(f, None),
        Err(BrokerError::AmbiguousRevision(f.0))
    );
    assert_eq!(
        info.il_to_native_map_len(f, None),
        Err(BrokerError::AmbiguousRevision(f.0))
    );
    let regions = info.code_regions(f, Some(rejit)).unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].start(), 0x3_0000);
    assert_eq!(info.rejit_ids(f), Ok(vec![rejit]));

    let history = info.revision_info(rejit).unwrap().history;
    assert_eq!(
        history,
        vec![
            RejitState::Requested,
            RejitState::ParametersPending,
            RejitState::ParametersSupplied,
            RejitState::CompilationStarted,
            RejitState::CompilationFinished(StatusCode::OK),
            RejitState::Active,
        ]
    );
}

#[test]
#[serial]
fn test_failed_parameter_supply_errors_the_revision() {
    let broker = broker_with(&FakeEngine::new());
    let (observer, info) = rejit_observer(&broker);
    observer
        .fail_parameters
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let m = method(5);
    let f = FunctionId(0x500);

    let rejit = request_one(&info, 5, RejitFlags::empty());
    let err = broker.begin_rejit_compilation(f, rejit, true).unwrap_err();
    assert!(matches!(err, BrokerError::Engine(_)));

    assert_eq!(
        info.rejit_state(rejit),
        Ok(RejitState::Errored(StatusCode::FAIL))
    );
    assert!(observer
        .seen()
        .contains(&Seen::RejitError(m, StatusCode::FAIL)));
    assert_eq!(broker.stats().rejit_errors, 1);
    assert!(broker.pending_rejits(m).is_empty());

    // Errored revisions are terminal
    assert!(matches!(
        broker.begin_rejit_compilation(f, rejit, true),
        Err(BrokerError::InvalidState(_))
    ));
}

#[test]
#[serial]
fn test_failed_compilation_reports_error() {
    let broker = broker_with(&FakeEngine::new());
    let (observer, info) = rejit_observer(&broker);
    let m = method(6);
    let f = FunctionId(0x600);

    let rejit = request_one(&info, 6, RejitFlags::empty());
    broker.begin_rejit_compilation(f, rejit, false).unwrap();
    let outcome = broker
        .finish_rejit_compilation(f, rejit, CodeRange::new(0x5_0000, 0x20), StatusCode::FAIL, false)
        .unwrap();

    assert!(matches!(outcome, CompileOutcome::Failed { status, .. } if status == StatusCode::FAIL));
    assert!(info.function_from_ip(0x5_0000).is_err());
    assert_eq!(
        observer.count(|seen| matches!(seen, Seen::RejitError(key, _) if *key == m)),
        1
    );
}

#[test]
#[serial]
fn test_overlapping_revision_code_errors_the_revision() {
    let broker = broker_with(&FakeEngine::new());
    let (observer, info) = rejit_observer(&broker);
    let m = method(7);
    let f = FunctionId(0x700);
    jit(&broker, f, m, CodeRange::new(0x1000, 0x100));

    let rejit = request_one(&info, 7, RejitFlags::empty());
    broker.begin_rejit_compilation(f, rejit, false).unwrap();
    let err = broker
        .finish_rejit_compilation(f, rejit, CodeRange::new(0x1080, 0x40), StatusCode::OK, false)
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidArgument(_)));

    assert!(matches!(info.rejit_state(rejit), Ok(RejitState::Errored(_))));
    assert!(info.code_regions(f, Some(rejit)).is_err());
    assert_eq!(info.function_from_ip(0x1090).unwrap().0, f);
    assert_eq!(broker.stats().rejit_errors, 1);
    assert_eq!(
        observer.count(|seen| matches!(seen, Seen::RejitError(key, _) if *key == m)),
        1
    );
    assert_eq!(
        observer.count(|seen| matches!(
            seen,
            Seen::RejitFinished(func, id, status) if *func == f && *id == rejit && !status.is_success()
        )),
        1
    );
}

#[test]
#[serial]
fn test_revert_discards_code_compiled_concurrently() {
    let broker = broker_with(&FakeEngine::new());
    let (_observer, info) = rejit_observer(&broker);
    let m = method(8);
    let f = FunctionId(0x800);

    let rejit = request_one(&info, 8, RejitFlags::empty());
    broker.begin_rejit_compilation(f, rejit, true).unwrap();

    let reverted = info.request_revert(&[m.module], &[m.token]).unwrap();
    assert_eq!(reverted.get(0), Some(&Ok(1)));
    assert_eq!(info.rejit_state(rejit), Ok(RejitState::Reverted));

    let outcome = broker
        .finish_rejit_compilation(f, rejit, CodeRange::new(0x6_0000, 0x40), StatusCode::OK, true)
        .unwrap();
    assert!(matches!(outcome, CompileOutcome::Discarded { .. }));
    assert!(info.function_from_ip(0x6_0010).is_err());

    // Nothing live is left to revert
    let again = info.request_revert(&[m.module], &[m.token]).unwrap();
    assert_eq!(again.failed_count(), 1);

    // A reverted request is skipped by the next compilation
    let queued = request_one(&info, 8, RejitFlags::empty());
    info.request_revert(&[m.module], &[m.token]).unwrap();
    assert!(matches!(
        broker.begin_rejit_compilation(f, queued, true),
        Err(BrokerError::InvalidState(_))
    ));
}

#[test]
#[serial]
fn test_request_batches_are_validated() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::JIT_COMPILATION);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();
    let m = method(1);
    assert_eq!(
        info.request_rejit(&[m.module], &[m.token], RejitFlags::empty())
            .unwrap_err(),
        BrokerError::RejitNotEnabled
    );
    broker.shutdown();

    let broker = broker_with(&FakeEngine::new());
    let (_observer, info) = rejit_observer(&broker);
    assert!(matches!(
        info.request_rejit(&[m.module, m.module], &[m.token], RejitFlags::empty()),
        Err(BrokerError::InvalidArgument(_))
    ));
    assert!(matches!(
        info.request_rejit(&[], &[], RejitFlags::empty()),
        Err(BrokerError::InvalidArgument(_))
    ));

    // Per-method failures do not fail the batch
    let batch = info
        .request_rejit(
            &[m.module, ModuleId(1)],
            &[m.token, MdToken(0)],
            RejitFlags::empty(),
        )
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.failed_count(), 1);
    assert!(batch.get(0).unwrap().is_ok());
    assert_eq!(broker.stats().rejit_requests, 2);
}

#[test]
#[serial]
fn test_inliners_are_recompiled_with_their_callee() {
    let broker = broker_with(&FakeEngine::new());
    let (observer, info) = rejit_observer(&broker);
    let callee = JitTarget::new(FunctionId(0x10), method(0x10));
    let caller = JitTarget::new(FunctionId(0x20), method(0x20));
    let other = JitTarget::new(FunctionId(0x30), method(0x30));

    assert!(broker.jit_inlining(caller, callee));
    assert!(broker.jit_inlining(other, callee));
    assert!(observer
        .seen()
        .contains(&Seen::Inlining(caller.function, callee.function)));

    let found = info
        .enumerate_inliners(callee.method.module, callee.method.token)
        .unwrap();
    assert_eq!(found.methods, vec![caller.method, other.method]);
    assert!(!found.incomplete);

    let result = info
        .request_rejit_with_inliners(
            RejitFlags::BLOCK_INLINING,
            &[callee.method.module, other.method.module],
            &[callee.method.token, other.method.token],
        )
        .unwrap();
    assert!(result.requested.all_succeeded());
    assert_eq!(result.inliner_methods, vec![caller.method]);
    assert!(result.inliners.all_succeeded());
    assert!(!result.incomplete);

    // A live BLOCK_INLINING revision refuses further inlining of the callee
    let late = JitTarget::new(FunctionId(0x40), method(0x40));
    assert!(!broker.jit_inlining(late, callee));

    broker.module_load_finished(UNTRACKED_MODULE, StatusCode::OK);
    let result = info
        .request_rejit_with_inliners(
            RejitFlags::empty(),
            &[other.method.module],
            &[other.method.token],
        )
        .unwrap();
    assert!(result.incomplete);
    assert!(result.inliner_methods.is_empty());
}

#[test]
#[serial]
fn test_detach_waits_for_active_recompilation() {
    let broker = broker_with(&FakeEngine::new());
    let (observer, info) = rejit_observer(&broker);
    let f = FunctionId(0x900);

    let rejit = request_one(&info, 9, RejitFlags::empty());
    broker.begin_rejit_compilation(f, rejit, true).unwrap();

    info.request_detach(Duration::from_millis(1)).unwrap();
    assert_eq!(broker.try_complete_detach(), Ok(false));
    assert_eq!(broker.rejit().active_compilations(), 1);

    broker
        .finish_rejit_compilation(f, rejit, CodeRange::new(0x7_0000, 0x10), StatusCode::OK, true)
        .unwrap();
    assert_eq!(broker.try_complete_detach(), Ok(true));
    assert_eq!(observer.seen().last(), Some(&Seen::DetachSucceeded));
    assert!(!broker.is_attached());
}
