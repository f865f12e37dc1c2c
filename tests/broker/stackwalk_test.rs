/*!
 * Stack Snapshot Tests
 */

use crate::common::{broker_with, jit, method, FakeEngine, Recorder};
use pretty_assertions::assert_eq;
use profiler_broker::code::CodeRange;
use profiler_broker::core::{BrokerConfig, BrokerError, FunctionId, ReJitId, ThreadId};
use profiler_broker::mask::{MonitorFlags, ObserverKind};
use profiler_broker::stackwalk::{FrameFunction, WalkControl, WalkFlags};
use profiler_broker::Broker;
use serial_test::serial;
use std::sync::Arc;

const WORKER: ThreadId = ThreadId(7);

fn walking_observer(broker: &Broker) -> Arc<Recorder> {
    let observer =
        Recorder::with_low(MonitorFlags::ENABLE_STACK_SNAPSHOT | MonitorFlags::JIT_COMPILATION);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    observer
}

#[test]
#[serial]
fn test_stop_after_first_frame() {
    let engine = FakeEngine::new();
    engine.set_stack(engine.current, &[0x10, 0x20, 0x30, 0x40]);
    let broker = broker_with(&engine);
    let info = walking_observer(&broker).info();

    let mut calls = 0;
    let outcome = info
        .do_stack_snapshot(None, WalkFlags::empty(), None, |_| {
            calls += 1;
            WalkControl::Stop
        })
        .unwrap();

    assert_eq!(calls, 1);
    assert_eq!(outcome.frames, 1);
    assert!(outcome.stopped_early);
    assert!(!outcome.truncated);
    // Same-thread walks do not suspend anything
    assert!(engine.thread_log.lock().is_empty());
    assert_eq!(broker.stats().walks, 1);
    assert_eq!(broker.stats().walk_failures, 0);
}

#[test]
#[serial]
fn test_managed_frames_resolve_through_code_table() {
    let engine = FakeEngine::new();
    let broker = broker_with(&engine);
    let info = walking_observer(&broker).info();

    let f = FunctionId(0xA0);
    jit(&broker, f, method(0xA0), CodeRange::new(0x5_0000, 0x200));
    engine.set_stack(engine.current, &[0x5_0010, 0xDEAD, 0x5_01FF]);

    let mut frames = Vec::new();
    let outcome = info
        .do_stack_snapshot(None, WalkFlags::REGISTER_CONTEXT, None, |frame| {
            frames.push((frame.index, frame.function, frame.context.map(<[u8]>::len)));
            WalkControl::Continue
        })
        .unwrap();

    assert_eq!(outcome.frames, 3);
    assert!(!outcome.stopped_early);
    let managed = FrameFunction::Managed {
        function: f,
        rejit: ReJitId::ORIGINAL,
    };
    assert_eq!(
        frames,
        vec![
            (0, managed, Some(8)),
            (1, FrameFunction::Unmanaged, Some(8)),
            (2, managed, Some(8)),
        ]
    );
}

#[test]
#[serial]
fn test_cross_thread_walk_suspends_and_resumes() {
    let engine = FakeEngine::new();
    engine.set_stack(WORKER, &[0x100, 0x200]);
    let broker = broker_with(&engine);
    let info = walking_observer(&broker).info();

    let mut threads = Vec::new();
    let outcome = info
        .do_stack_snapshot(Some(WORKER), WalkFlags::empty(), None, |frame| {
            threads.push(frame.thread);
            assert!(frame.context.is_none());
            WalkControl::Continue
        })
        .unwrap();

    assert_eq!(outcome.frames, 2);
    assert_eq!(threads, vec![WORKER, WORKER]);
    assert_eq!(
        *engine.thread_log.lock(),
        vec!["suspend 7".to_string(), "resume 7".to_string()]
    );
}

#[test]
#[serial]
fn test_exited_thread_fails_whole_walk() {
    let engine = FakeEngine::new();
    engine.set_stack(WORKER, &[0x100, 0x200]);
    engine.exit_thread(WORKER);
    let broker = broker_with(&engine);
    let info = walking_observer(&broker).info();

    let mut calls = 0;
    let result = info.do_stack_snapshot(Some(WORKER), WalkFlags::empty(), None, |_| {
        calls += 1;
        WalkControl::Continue
    });

    assert!(matches!(result, Err(BrokerError::Engine(_))));
    assert_eq!(calls, 0);
    assert_eq!(broker.stats().walk_failures, 1);
    // The suspended thread is released even though the walk failed
    assert_eq!(
        *engine.thread_log.lock(),
        vec!["suspend 7".to_string(), "resume 7".to_string()]
    );
}

#[test]
#[serial]
fn test_walk_depth_is_bounded() {
    let engine = FakeEngine::new();
    let ips: Vec<usize> = (1..=10).map(|i| i * 0x10).collect();
    engine.set_stack(engine.current, &ips);
    let broker = Broker::builder()
        .with_config(BrokerConfig {
            max_walk_depth: 4,
            ..BrokerConfig::default()
        })
        .with_engine(Arc::clone(&engine))
        .build();
    let info = walking_observer(&broker).info();

    let outcome = info
        .do_stack_snapshot(None, WalkFlags::empty(), None, |_| WalkControl::Continue)
        .unwrap();
    assert_eq!(outcome.frames, 4);
    assert!(outcome.truncated);
}

#[test]
#[serial]
fn test_snapshots_require_enabling() {
    let engine = FakeEngine::new();
    engine.set_stack(engine.current, &[0x10]);
    let broker = broker_with(&engine);
    let observer = Recorder::with_low(MonitorFlags::JIT_COMPILATION);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();

    let result = observer
        .info()
        .do_stack_snapshot(None, WalkFlags::empty(), None, |_| WalkControl::Continue);
    assert!(matches!(result, Err(BrokerError::NotAvailable(_))));
    assert_eq!(broker.stats().walks, 0);
}

#[test]
#[serial]
fn test_engine_without_walk_support() {
    let engine = FakeEngine::new();
    engine
        .walks_supported
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let broker = broker_with(&engine);
    let info = walking_observer(&broker).info();

    let result = info.do_stack_snapshot(None, WalkFlags::empty(), None, |_| WalkControl::Continue);
    assert!(matches!(result, Err(BrokerError::NotAvailable(_))));
}
