/*!
 * Observer Services Tests
 * Metadata, IL maps, body replacement, hooks and engine passthroughs
 */

use crate::common::{broker_with, jit, method, FakeEngine, Recorder};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use profiler_broker::broker::{EnterLeaveHooks, FunctionMapping, HookFrame, HookKind};
use profiler_broker::callbacks::{JitTarget, ProfilerCallback};
use profiler_broker::code::CodeRange;
use profiler_broker::core::{
    BrokerError, CallbackResult, ClassId, FunctionId, IlToNativeEntry, MdToken, ModuleId, ReJitId,
    StatusCode, ThreadId,
};
use profiler_broker::mask::{EventMask, MonitorFlags, ObserverKind};
use profiler_broker::objects::{Generation, ObjectId};
use profiler_broker::ProfilerInfo;
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
#[serial]
fn test_metadata_queries_pass_through() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(
        MonitorFlags::JIT_COMPILATION | MonitorFlags::OBJECT_ALLOCATED | MonitorFlags::ENABLE_OBJECT_ALLOCATED,
    );
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    assert_eq!(info.class_info(ClassId(5)).unwrap().token, MdToken(0x0200_0005));
    assert_eq!(info.function_info(FunctionId(9)).unwrap().token, MdToken(0x0600_0009));
    let module = info.module_info(ModuleId(2)).unwrap();
    assert_eq!(module.name, "module2.dll");
    assert_eq!(module.base_address, 0x4020_0000);
    assert!(matches!(
        info.metadata_importer(ModuleId(2)),
        Err(BrokerError::NotAvailable(_))
    ));

    // Tracked objects answer from the broker, others fall back to the engine
    broker
        .object_allocated(ObjectId(0x6000), ClassId(0x31), 24, Generation::Gen0)
        .unwrap();
    let tracked = broker.objects().current_ref(ObjectId(0x6000));
    let untracked = broker.objects().current_ref(ObjectId(0x7000));
    assert_eq!(info.class_from_object(tracked), Ok(ClassId(0x31)));
    assert_eq!(info.class_from_object(untracked), Ok(ClassId(0x77)));
}

#[test]
#[serial]
fn test_il_map_two_pass_copy() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::JIT_COMPILATION | MonitorFlags::ENABLE_JIT_MAPS);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    let f = FunctionId(0xB0);
    jit(&broker, f, method(0xB0), CodeRange::new(0x8_0000, 0x60));
    let entries = [
        IlToNativeEntry { il_offset: 0, native_start: 0, native_end: 0x10 },
        IlToNativeEntry { il_offset: 4, native_start: 0x10, native_end: 0x28 },
        IlToNativeEntry { il_offset: 9, native_start: 0x28, native_end: 0x60 },
    ];
    broker.set_il_to_native_map(f, ReJitId::ORIGINAL, &entries);

    let needed = info.il_to_native_map_len(f, None).unwrap();
    assert_eq!(needed, 3);

    let mut short = vec![IlToNativeEntry { il_offset: 0, native_start: 0, native_end: 0 }; 1];
    assert_eq!(
        info.copy_il_to_native_map(f, None, &mut short),
        Err(BrokerError::InsufficientBuffer { required: 3, provided: 1 })
    );

    let mut buf = vec![IlToNativeEntry { il_offset: 0, native_start: 0, native_end: 0 }; needed];
    assert_eq!(info.copy_il_to_native_map(f, None, &mut buf), Ok(3));
    assert_eq!(buf, entries.to_vec());
    assert_eq!(info.il_to_native_map(f, Some(ReJitId::ORIGINAL)), Ok(entries.to_vec()));
}

#[test]
#[serial]
fn test_method_body_replaced_only_before_first_compilation() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::JIT_COMPILATION);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();
    let m = method(0xC0);
    let body = [0x2A, 0x00, 0x17];

    assert!(matches!(
        info.set_il_function_body(m.module, m.token, &[]),
        Err(BrokerError::InvalidArgument(_))
    ));
    info.set_il_function_body(m.module, m.token, &body).unwrap();

    let target = JitTarget::new(FunctionId(0xC0), m);
    let replaced = broker.jit_compilation_started(target, true);
    assert_eq!(replaced.as_deref(), Some(&body[..]));
    broker
        .jit_compilation_finished(
            target,
            CodeRange::new(0x9_0000, 0x20),
            StatusCode::OK,
            true,
        )
        .unwrap();

    assert!(matches!(
        info.set_il_function_body(m.module, m.token, &body),
        Err(BrokerError::InvalidState(_))
    ));
}

#[test]
#[serial]
fn test_engine_mutations_require_their_flags() {
    let engine = FakeEngine::new();
    let broker = broker_with(&engine);
    let observer = Recorder::with_low(MonitorFlags::THREADS);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    assert!(matches!(info.force_gc(), Err(BrokerError::InvalidState(_))));
    assert!(matches!(
        info.request_instrumented_thread(),
        Err(BrokerError::InvalidState(_))
    ));
    let m = method(1);
    assert!(matches!(
        info.set_il_function_body(m.module, m.token, &[1]),
        Err(BrokerError::InvalidState(_))
    ));
    assert_eq!(engine.forced_gcs.load(Ordering::SeqCst), 0);
    broker.shutdown();

    let broker = broker_with(&engine);
    let observer = Recorder::with_low(MonitorFlags::GC | MonitorFlags::ENABLE_INPROC_DEBUGGING);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    info.force_gc().unwrap();
    assert_eq!(engine.forced_gcs.load(Ordering::SeqCst), 1);
    assert_eq!(info.request_instrumented_thread(), Ok(ThreadId(0xD1)));
}

#[test]
#[serial]
fn test_environment_passthrough() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::THREADS);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();
    let name = "PROFILER_BROKER_INFO_TEST";

    info.set_environment_variable(name, Some("enabled")).unwrap();
    assert_eq!(info.environment_variable(name), Ok(Some("enabled".to_string())));
    info.set_environment_variable(name, None).unwrap();
    assert_eq!(info.environment_variable(name), Ok(None));
    assert!(matches!(
        info.environment_variable("NOT=VALID"),
        Err(BrokerError::InvalidArgument(_))
    ));
}

type Probe = (HookKind, u64, Option<Vec<u8>>, Option<Vec<u8>>);

/// Installs probes from `initialize`; odd functions are not probed
struct Hooked {
    probes: Arc<Mutex<Vec<Probe>>>,
    info: Mutex<Option<ProfilerInfo>>,
}

impl ProfilerCallback for Hooked {
    fn initialize(&self, info: ProfilerInfo) -> CallbackResult {
        info.set_event_mask(EventMask::low(
            MonitorFlags::ENTERLEAVE | MonitorFlags::ENABLE_FUNCTION_ARGS,
        ))?;
        let probes = Arc::clone(&self.probes);
        info.set_enter_leave_hooks(EnterLeaveHooks::Combined(Arc::new(
            move |kind: HookKind, client_id: u64, frame: &HookFrame<'_>| {
                probes.lock().push((
                    kind,
                    client_id,
                    frame.arguments.map(<[u8]>::to_vec),
                    frame.return_value.map(<[u8]>::to_vec),
                ));
            },
        )))?;
        info.set_function_id_mapper(Arc::new(|function: FunctionId| -> CallbackResult<FunctionMapping> {
            Ok(FunctionMapping {
                client_id: function.0 * 10,
                hook: function.0 % 2 == 0,
            })
        }))?;
        *self.info.lock() = Some(info);
        Ok(())
    }
}

#[test]
#[serial]
fn test_enter_leave_probes_follow_function_mapping() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Arc::new(Hooked {
        probes: Arc::new(Mutex::new(Vec::new())),
        info: Mutex::new(None),
    });
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();

    assert!(broker.map_function(FunctionId(4)));
    assert!(!broker.map_function(FunctionId(5)));

    assert!(broker.function_enter(FunctionId(4), 0x1, &[7, 8]));
    assert!(broker.function_leave(FunctionId(4), 0x1, &[9]));
    assert!(broker.function_tailcall(FunctionId(4), 0x1));
    assert!(!broker.function_enter(FunctionId(5), 0x2, &[1]));

    assert_eq!(
        *observer.probes.lock(),
        vec![
            (HookKind::Enter, 40, Some(vec![7, 8]), None),
            (HookKind::Leave, 40, None, None),
            (HookKind::Tailcall, 40, None, None),
        ]
    );

    // Probes can only be installed while initializing
    let info = observer.info.lock().clone().unwrap();
    let late = info.set_enter_leave_hooks(EnterLeaveHooks::Combined(Arc::new(
        |_: HookKind, _: u64, _: &HookFrame<'_>| {},
    )));
    assert!(matches!(late, Err(BrokerError::InvalidState(_))));
}
