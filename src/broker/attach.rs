/*!
 * Attach and Detach
 *
 * Exactly one initializer runs per session. Immutable mask bits lock when
 * it returns. Detach is a handshake: the observer requests it, the engine
 * polls `try_complete_detach`, and `profiler_detach_succeeded` is delivered
 * only once nothing can still call into the observer.
 */

use super::info::ProfilerInfo;
use super::Broker;
use crate::callbacks::{CallbackSet, ProfilerCallback};
use crate::core::errors::BrokerError;
use crate::core::id::SessionId;
use crate::core::types::BrokerResult;
use crate::dispatch::{Dispatched, LifecycleState};
use crate::mask::{AttachMode, ObserverKind};
use crate::monitoring::span_operation;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Broker {
    /// Load an observer at engine startup and run its `initialize`
    pub fn attach_startup(
        &self,
        observer: Arc<dyn ProfilerCallback>,
        kind: ObserverKind,
    ) -> BrokerResult<SessionId> {
        let span = span_operation("attach_startup");
        let _entered = span.enter();

        let set = CallbackSet::new(observer);
        let session = self.begin_session(AttachMode::Startup, kind, set)?;
        let info = ProfilerInfo::new(Arc::downgrade(&self.inner), session);

        let outcome = self.inner.dispatcher.dispatch_mandatory(
            "initialize",
            || info,
            |set, info| set.v1().initialize(info),
        );
        self.finish_initialization(outcome, session)?;

        span.record_result(true);
        Ok(session)
    }

    /// Load an observer into a running engine
    ///
    /// Requires an observer implementing `ProfilerCallback3`. `client_data`
    /// is only lent to the observer for the duration of `initialize_for_attach`.
    pub fn attach_running(
        &self,
        observer: Arc<dyn ProfilerCallback>,
        client_data: &[u8],
    ) -> BrokerResult<SessionId> {
        let span = span_operation("attach_running");
        let _entered = span.enter();

        let set = CallbackSet::new(observer);
        if set.v3().is_none() {
            return Err(BrokerError::invalid_argument(format!(
                "observer implements callbacks {} but attaching to a running engine needs v3",
                set.version()
            )));
        }

        let session = self.begin_session(AttachMode::Running, ObserverKind::Primary, set)?;
        let info = ProfilerInfo::new(Arc::downgrade(&self.inner), session);

        let outcome = self.inner.dispatcher.dispatch_mandatory(
            "initialize_for_attach",
            || info,
            |set, info| match set.v3() {
                Some(v3) => v3.initialize_for_attach(info, client_data),
                None => Ok(()),
            },
        );
        self.finish_initialization(outcome, session)?;

        self.inner.dispatcher.dispatch_mandatory(
            "profiler_attach_complete",
            || (),
            |set, ()| match set.v3() {
                Some(v3) => v3.profiler_attach_complete(),
                None => Ok(()),
            },
        );

        span.record_result(true);
        Ok(session)
    }

    fn begin_session(
        &self,
        mode: AttachMode,
        kind: ObserverKind,
        set: CallbackSet,
    ) -> BrokerResult<SessionId> {
        let session = self.inner.lifecycle.begin(mode)?;
        self.inner.dispatcher.mask().reset(mode, kind);
        info!(
            session = %session,
            ?mode,
            ?kind,
            version = %set.version(),
            "attaching observer"
        );
        self.inner.dispatcher.install(set);
        Ok(session)
    }

    fn finish_initialization(
        &self,
        outcome: Dispatched<()>,
        session: SessionId,
    ) -> BrokerResult<()> {
        let failure = match outcome {
            Dispatched::Delivered(()) => None,
            Dispatched::Failed(e) => Some(format!("observer initialization failed: {}", e)),
            Dispatched::Suppressed => Some("observer was not reachable during initialization".to_string()),
        };

        if let Some(message) = failure {
            warn!(session = %session, error = %message, "attach aborted");
            self.inner.dispatcher.uninstall();
            self.inner.reset_tables();
            self.inner.lifecycle.end();
            return Err(BrokerError::Engine(message));
        }

        self.inner.dispatcher.mask().lock_immutable();
        self.inner
            .lifecycle
            .transition(LifecycleState::Initializing, LifecycleState::Attached)?;
        info!(session = %session, mask = %self.event_mask(), "observer attached");
        Ok(())
    }

    /// Poll whether a requested detach can complete
    ///
    /// Returns `Ok(true)` once `profiler_detach_succeeded` has been delivered
    /// and the observer slot released. While callbacks, walks or
    /// recompilations are still running it returns `Ok(false)`; the engine
    /// keeps polling at `config().detach_poll_interval`.
    pub fn try_complete_detach(&self) -> BrokerResult<bool> {
        let inner = &self.inner;
        match inner.lifecycle.state() {
            LifecycleState::Detaching => {}
            LifecycleState::Detached => return Err(BrokerError::NotAttached),
            state => {
                return Err(BrokerError::invalid_state(format!(
                    "detach was not requested (observer is {:?})",
                    state
                )))
            }
        }

        let walks = inner.walker.active_walks();
        let compilations = inner.rejit.active_compilations();
        if walks > 0 || compilations > 0 {
            debug!(walks, compilations, "detach pending on active work");
            return Ok(false);
        }

        let Some(set) = inner.dispatcher.try_quiesce() else {
            debug!(
                in_flight = inner.dispatcher.in_flight(),
                "detach pending on in-flight callbacks"
            );
            return Ok(false);
        };

        inner
            .dispatcher
            .deliver_to(&set, "profiler_detach_succeeded", |set| match set.v3() {
                Some(v3) => v3.profiler_detach_succeeded(),
                None => Ok(()),
            });

        inner.reset_tables();
        inner.lifecycle.end();
        info!("observer detached");
        Ok(true)
    }

    /// Engine shutdown: deliver `shutdown` and tear the session down
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.lifecycle.state() == LifecycleState::Detached {
            return;
        }

        inner
            .dispatcher
            .dispatch_mandatory("shutdown", || (), |set, ()| set.v1().shutdown());
        inner.dispatcher.uninstall();
        inner.reset_tables();
        inner.lifecycle.end();
        info!("broker shut down");
    }
}
