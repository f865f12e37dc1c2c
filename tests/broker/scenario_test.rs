/*!
 * End-to-End Scenarios
 * Compilation events, a relocating collection and a recompilation
 */

use crate::common::{broker_with, jit, method, run_collection, FakeEngine, Recorder, Seen};
use pretty_assertions::assert_eq;
use profiler_broker::callbacks::EngineEvent;
use profiler_broker::code::CodeRange;
use profiler_broker::core::{ClassId, FunctionId, ReJitId, StatusCode};
use profiler_broker::mask::{EventMask, HighMonitorFlags, MonitorFlags, ObserverKind};
use profiler_broker::objects::{
    Generation, GenerationSet, ManagedObjectRef, MovedRangeBatch, ObjectId, SurvivedRangeBatch,
};
use profiler_broker::rejit::{CodegenFlags, CompileOutcome, RejitFlags, RejitState};
use profiler_broker::BrokerError;
use serial_test::serial;

#[test]
#[serial]
fn test_only_enabled_compilation_events_are_observed() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::JIT_COMPILATION);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    observer.clear();

    for i in 1..=3u32 {
        jit(
            &broker,
            FunctionId(0x100 + i as u64),
            method(i),
            CodeRange::new(0x10_0000 * i as usize, 0x80),
        );
    }

    // Unrelated engine activity while only compilation events are enabled
    run_collection(
        &broker,
        GenerationSet::GEN0,
        &MovedRangeBatch::new(),
        &SurvivedRangeBatch::new(),
    );
    assert!(broker.exception_thrown(ObjectId(0x5000)).is_suppressed());
    assert!(broker
        .raise(EngineEvent::ExceptionCatcherLeave)
        .is_suppressed());

    let finished: Vec<FunctionId> = observer
        .seen()
        .into_iter()
        .filter_map(|seen| match seen {
            Seen::JitFinished(function, StatusCode::OK) => Some(function),
            _ => None,
        })
        .collect();
    assert_eq!(
        finished,
        vec![FunctionId(0x101), FunctionId(0x102), FunctionId(0x103)]
    );
    assert_eq!(observer.count(|s| s.is_gc()), 0);
    assert_eq!(observer.count(|s| *s == Seen::Exception), 0);
}

#[test]
#[serial]
fn test_relocating_collection_remaps_identities() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::new(EventMask::new(
        MonitorFlags::GC
            | MonitorFlags::SUSPENDS
            | MonitorFlags::OBJECT_ALLOCATED
            | MonitorFlags::ENABLE_OBJECT_ALLOCATED,
        HighMonitorFlags::BASIC_GC | HighMonitorFlags::GC_MOVED_OBJECTS,
    ));
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    let class = ClassId(0x30);
    for i in 0..5 {
        broker
            .object_allocated(ObjectId(0x1000 + 8 * i), class, 8, Generation::Gen0)
            .unwrap();
    }
    for i in 0..12 {
        broker
            .object_allocated(ObjectId(0x2000 + 8 * i), class, 8, Generation::Gen0)
            .unwrap();
    }
    let before: Vec<ManagedObjectRef> = observer
        .seen()
        .into_iter()
        .filter_map(|seen| match seen {
            Seen::ObjectAllocated(object) => Some(object),
            _ => None,
        })
        .collect();
    assert_eq!(before.len(), 17);
    observer.clear();

    let mut moved = MovedRangeBatch::new();
    moved.push(0x1000, 0x9000, 5 * 8).unwrap();
    moved.push(0x2000, 0xA000, 12 * 8).unwrap();
    let summary = run_collection(&broker, GenerationSet::GEN0, &moved, &SurvivedRangeBatch::new());

    assert_eq!(summary.moved_ranges, 2);
    assert_eq!(summary.moved_objects, 17);
    assert_eq!(summary.reclaimed_objects, 0);

    let gc_events: Vec<Seen> = observer.seen().into_iter().filter(Seen::is_gc).collect();
    assert_eq!(
        gc_events,
        vec![
            Seen::Suspend,
            Seen::GcStarted(GenerationSet::GEN0),
            Seen::Moved(vec![(0x1000, 0x9000, 40), (0x2000, 0xA000, 96)]),
            Seen::GcFinished,
            Seen::Resume,
        ]
    );

    for (i, old) in before.iter().enumerate() {
        assert!(matches!(
            info.object_size(*old),
            Err(BrokerError::StaleObjectRef(_))
        ));

        let remapped = info.remap_object(*old).unwrap();
        let expected = if i < 5 {
            0x9000 + 8 * i
        } else {
            0xA000 + 8 * (i - 5)
        };
        assert_eq!(remapped.id, ObjectId(expected));
        assert_eq!(remapped.epoch, summary.epoch);
        assert_eq!(info.object_size(remapped), Ok(8));
        assert_eq!(info.object_generation(remapped), Ok(Generation::Gen1));
        assert_eq!(info.class_from_object(remapped), Ok(class));
    }
}

#[test]
#[serial]
fn test_recompiled_code_resolves_to_new_revision() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::ENABLE_REJIT | MonitorFlags::JIT_COMPILATION);
    *observer.codegen.lock() = CodegenFlags::DISABLE_INLINING;
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    let m = method(7);
    let f = FunctionId(0x700);
    jit(&broker, f, m, CodeRange::new(0x1_0000, 0x100));

    let batch = info
        .request_rejit(&[m.module], &[m.token], RejitFlags::empty())
        .unwrap();
    assert!(batch.all_succeeded());
    let rejit = batch.get(0).unwrap().clone().unwrap();
    assert!(!rejit.is_original());
    assert_eq!(broker.pending_rejits(m), vec![rejit]);

    let params = broker.begin_rejit_compilation(f, rejit, true).unwrap();
    assert_eq!(params.codegen, CodegenFlags::DISABLE_INLINING);

    let outcome = broker
        .finish_rejit_compilation(f, rejit, CodeRange::new(0x2_0000, 0x80), StatusCode::OK, true)
        .unwrap();
    assert!(matches!(outcome, CompileOutcome::Activated { method, .. } if method == m));

    for ip in (0x2_0000..0x2_0080).step_by(7) {
        assert_eq!(info.function_from_ip(ip), Ok((f, rejit)));
    }
    assert_eq!(info.function_from_ip(0x1_0010), Ok((f, ReJitId::ORIGINAL)));
    assert_eq!(info.rejit_state(rejit), Ok(RejitState::Active));
    assert_eq!(broker.rejit().info(rejit).unwrap().method, m);
    assert_eq!(info.rejit_ids(f), Ok(vec![rejit]));
    assert!(broker.pending_rejits(m).is_empty());

    let seen = observer.seen();
    let supplied = seen
        .iter()
        .position(|s| *s == Seen::RejitParameters(m))
        .unwrap();
    let started = seen
        .iter()
        .position(|s| *s == Seen::RejitStarted(f, rejit))
        .unwrap();
    let finished = seen
        .iter()
        .position(|s| *s == Seen::RejitFinished(f, rejit, StatusCode::OK))
        .unwrap();
    assert!(supplied < started && started < finished);
}
