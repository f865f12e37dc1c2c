/*!
 * Attach / Detach Tests
 * Single observer slot, initializer ordering and the detach handshake
 */

use crate::common::{broker_with, FakeEngine, Legacy, Recorder, Seen};
use pretty_assertions::assert_eq;
use profiler_broker::callbacks::{
    EngineEvent, ProfilerCallback, ProfilerCallback2, ProfilerCallback3,
};
use profiler_broker::core::{BrokerError, CallbackResult, ThreadId};
use profiler_broker::dispatch::slot_occupied;
use profiler_broker::mask::{EventMask, MonitorFlags, ObserverKind};
use profiler_broker::{Broker, LifecycleState, ProfilerInfo};
use serial_test::serial;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::time::Duration;

#[test]
#[serial]
fn test_startup_attach_and_shutdown() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::THREADS);

    let session = broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    assert_eq!(broker.lifecycle_state(), LifecycleState::Attached);
    assert_eq!(broker.session_id(), Some(session));
    assert_eq!(broker.event_mask(), EventMask::low(MonitorFlags::THREADS));
    assert!(slot_occupied());

    broker.shutdown();
    assert_eq!(broker.lifecycle_state(), LifecycleState::Detached);
    assert!(!slot_occupied());
    assert_eq!(observer.seen(), vec![Seen::Initialize, Seen::Shutdown]);
}

#[test]
#[serial]
fn test_one_observer_per_process() {
    let first = broker_with(&FakeEngine::new());
    let second = broker_with(&FakeEngine::new());

    first
        .attach_startup(Recorder::with_low(MonitorFlags::NONE), ObserverKind::Primary)
        .unwrap();

    let err = second
        .attach_startup(Recorder::with_low(MonitorFlags::NONE), ObserverKind::Primary)
        .unwrap_err();
    assert_eq!(err, BrokerError::AlreadyAttached);

    let err = first
        .attach_startup(Recorder::with_low(MonitorFlags::NONE), ObserverKind::Primary)
        .unwrap_err();
    assert_eq!(err, BrokerError::AlreadyAttached);

    drop(first);
    assert!(!slot_occupied());
    second
        .attach_startup(Recorder::with_low(MonitorFlags::NONE), ObserverKind::Primary)
        .unwrap();
}

#[test]
#[serial]
fn test_failed_initialize_releases_slot() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::THREADS);
    observer
        .fail_initialize
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap_err();
    assert!(matches!(err, BrokerError::Engine(_)));
    assert_eq!(broker.lifecycle_state(), LifecycleState::Detached);
    assert!(!slot_occupied());
    assert!(broker.event_mask().is_empty());

    observer
        .fail_initialize
        .store(false, std::sync::atomic::Ordering::SeqCst);
    broker.attach_startup(observer, ObserverKind::Primary).unwrap();
}

#[test]
#[serial]
fn test_immutable_bits_lock_after_initialize() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::ENABLE_REJIT | MonitorFlags::THREADS);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    // Mutable bits may change freely
    info.set_event_mask(EventMask::low(
        MonitorFlags::ENABLE_REJIT | MonitorFlags::JIT_COMPILATION,
    ))
    .unwrap();

    let err = info
        .set_event_mask(EventMask::low(MonitorFlags::JIT_COMPILATION))
        .unwrap_err();
    assert!(matches!(err, BrokerError::ImmutableFlags(_)));
    assert!(err.is_ordering_violation());
    assert_eq!(
        broker.event_mask(),
        EventMask::low(MonitorFlags::ENABLE_REJIT | MonitorFlags::JIT_COMPILATION)
    );
}

#[test]
#[serial]
fn test_notification_only_observer_is_restricted() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::THREADS);
    broker
        .attach_startup(observer.clone(), ObserverKind::NotificationOnly)
        .unwrap();
    let info = observer.info();

    assert!(matches!(
        info.force_gc(),
        Err(BrokerError::NotAvailable(_))
    ));
    assert!(matches!(
        info.set_event_mask(EventMask::low(MonitorFlags::ENABLE_REJIT)),
        Err(BrokerError::InvalidArgument(_))
    ));
}

#[test]
#[serial]
fn test_running_attach_requires_attach_callbacks() {
    let broker = broker_with(&FakeEngine::new());
    let err = broker
        .attach_running(Legacy::new(EventMask::EMPTY), b"config")
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidArgument(_)));
    assert!(!slot_occupied());

    let observer = Recorder::with_low(MonitorFlags::THREADS);
    broker.attach_running(observer.clone(), b"config").unwrap();
    assert_eq!(observer.seen(), vec![Seen::Initialize, Seen::AttachComplete]);
}

#[test]
#[serial]
fn test_running_attach_rejects_startup_only_bits() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::ENTERLEAVE);

    let err = broker.attach_running(observer.clone(), &[]).unwrap_err();
    assert!(matches!(err, BrokerError::Engine(_)));
    assert!(observer.seen().is_empty());
    assert_eq!(broker.lifecycle_state(), LifecycleState::Detached);
}

#[test]
#[serial]
fn test_detach_handshake() {
    let broker = broker_with(&FakeEngine::new());
    let observer = Recorder::with_low(MonitorFlags::THREADS);
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();
    let info = observer.info();

    assert!(matches!(
        broker.try_complete_detach(),
        Err(BrokerError::InvalidState(_))
    ));

    info.request_detach(Duration::from_millis(250)).unwrap();
    assert_eq!(broker.lifecycle_state(), LifecycleState::Detaching);
    assert!(broker.event_mask().is_empty());
    assert!(broker
        .raise(EngineEvent::ThreadCreated { thread: ThreadId(4) })
        .is_suppressed());

    assert_eq!(broker.try_complete_detach(), Ok(true));
    assert_eq!(broker.lifecycle_state(), LifecycleState::Detached);
    assert!(!slot_occupied());
    assert_eq!(
        observer.seen(),
        vec![Seen::Initialize, Seen::DetachSucceeded]
    );

    // The old handle must not reach a later session
    assert_eq!(info.event_mask(), Err(BrokerError::NotAttached));
    assert_eq!(broker.try_complete_detach(), Err(BrokerError::NotAttached));

    let next = Recorder::with_low(MonitorFlags::NONE);
    let session = broker.attach_startup(next, ObserverKind::Primary).unwrap();
    assert_ne!(info.session_id(), session);
    assert_eq!(info.event_mask(), Err(BrokerError::NotAttached));
}

#[test]
#[serial]
fn test_detach_requires_attach_callbacks() {
    struct Silent {
        info: parking_lot::Mutex<Option<ProfilerInfo>>,
    }
    impl ProfilerCallback for Silent {
        fn initialize(&self, info: ProfilerInfo) -> CallbackResult {
            *self.info.lock() = Some(info);
            Ok(())
        }
    }

    let broker = broker_with(&FakeEngine::new());
    let observer = Arc::new(Silent {
        info: parking_lot::Mutex::new(None),
    });
    broker
        .attach_startup(observer.clone(), ObserverKind::Primary)
        .unwrap();

    let info = observer.info.lock().clone().unwrap();
    assert!(matches!(
        info.request_detach(Duration::from_secs(1)),
        Err(BrokerError::NotAvailable(_))
    ));
    assert_eq!(broker.lifecycle_state(), LifecycleState::Attached);
}

/// Observer whose thread callback parks until released
struct Parking {
    inner: Arc<Recorder>,
    entered: Arc<Barrier>,
    release: parking_lot::Mutex<mpsc::Receiver<()>>,
}

impl ProfilerCallback for Parking {
    profiler_broker::impl_callback_versions!(v3);

    fn initialize(&self, info: ProfilerInfo) -> CallbackResult {
        self.inner.initialize(info)
    }

    fn thread_created(&self, _thread: ThreadId) -> CallbackResult {
        self.entered.wait();
        let _ = self.release.lock().recv();
        Ok(())
    }
}

impl ProfilerCallback2 for Parking {}

impl ProfilerCallback3 for Parking {
    fn profiler_detach_succeeded(&self) -> CallbackResult {
        self.inner.profiler_detach_succeeded()
    }
}

#[test]
#[serial]
fn test_detach_waits_for_in_flight_callbacks() {
    let broker = broker_with(&FakeEngine::new());
    let recorder = Recorder::with_low(MonitorFlags::THREADS);
    let entered = Arc::new(Barrier::new(2));
    let (release, parked) = mpsc::channel();
    let observer = Arc::new(Parking {
        inner: recorder.clone(),
        entered: entered.clone(),
        release: parking_lot::Mutex::new(parked),
    });
    broker
        .attach_startup(observer, ObserverKind::Primary)
        .unwrap();

    std::thread::scope(|scope| {
        let raiser = scope.spawn(|| broker.raise(EngineEvent::ThreadCreated { thread: ThreadId(2) }));

        entered.wait();
        recorder.info().request_detach(Duration::from_millis(10)).unwrap();
        assert_eq!(broker.callbacks_in_flight(), 1);
        assert_eq!(broker.try_complete_detach(), Ok(false));
        assert_eq!(broker.lifecycle_state(), LifecycleState::Detaching);

        release.send(()).unwrap();
        assert!(raiser.join().unwrap().is_delivered());
    });

    assert_eq!(broker.try_complete_detach(), Ok(true));
    assert_eq!(
        recorder.count(|s| *s == Seen::DetachSucceeded),
        1
    );
}

#[test]
#[serial]
fn test_dropping_broker_shuts_observer_down() {
    let observer = Recorder::with_low(MonitorFlags::NONE);
    {
        let broker: Broker = broker_with(&FakeEngine::new());
        broker
            .attach_startup(observer.clone(), ObserverKind::Primary)
            .unwrap();
    }
    assert_eq!(observer.seen().last(), Some(&Seen::Shutdown));
    assert!(!slot_occupied());
}
