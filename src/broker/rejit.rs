/*!
 * Recompilation Entry Points
 *
 * The engine brackets each recompilation with `begin_rejit_compilation`
 * and `finish_rejit_compilation`. Parameters are collected from the
 * observer at the start of the bracket if they were not supplied yet.
 */

use super::Broker;
use crate::code::{CodeRange, CompiledCodeRegion};
use crate::core::errors::BrokerError;
use crate::core::types::{BrokerResult, FunctionId, MethodKey, ReJitId, StatusCode};
use crate::dispatch::Dispatched;
use crate::mask::EventCategory;
use crate::rejit::{CompileOutcome, RejitParameters, SupplyOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Broker {
    /// Revisions of `method` waiting to be compiled, oldest first
    pub fn pending_rejits(&self, method: MethodKey) -> Vec<ReJitId> {
        self.inner.rejit.pending(method)
    }

    /// Start compiling one instantiation of a revision
    ///
    /// Returns the parameters the engine must compile with. When the
    /// observer's parameter callback fails the revision is errored, the
    /// observer gets `rejit_error`, and the call fails.
    pub fn begin_rejit_compilation(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        safe_to_block: bool,
    ) -> BrokerResult<Arc<RejitParameters>> {
        let inner = &self.inner;
        let supply = inner.rejit.supply_parameters(rejit, |control| {
            let method = control.method();
            let outcome = inner.dispatcher.dispatch(
                EventCategory::Rejit,
                || (),
                |set, ()| match set.v4() {
                    Some(v4) => v4.get_rejit_parameters(method.module, method.token, control),
                    None => Ok(()),
                },
            );
            match outcome {
                Dispatched::Failed(e) => Err(e),
                _ => Ok(()),
            }
        })?;

        match supply {
            SupplyOutcome::Supplied | SupplyOutcome::AlreadySupplied => {}
            SupplyOutcome::Skipped => {
                return Err(BrokerError::invalid_state(format!(
                    "revision {} was reverted or failed before compilation",
                    rejit
                )));
            }
            SupplyOutcome::Failed(e) => {
                if let Some(info) = inner.rejit.info(rejit) {
                    self.report_rejit_error(info.method, Some(function), e.status);
                }
                return Err(BrokerError::Engine(format!(
                    "parameters for revision {} were not supplied: {}",
                    rejit, e
                )));
            }
        }

        let method = inner.rejit.begin_compilation(rejit, function)?;
        inner.functions.insert(function, method);
        inner.dispatcher.dispatch(
            EventCategory::Rejit,
            || (),
            |set, ()| match set.v4() {
                Some(v4) => v4.rejit_compilation_started(function, rejit, safe_to_block),
                None => Ok(()),
            },
        );

        Ok(inner.rejit.parameters(rejit).unwrap_or_default())
    }

    /// Finish the bracket opened by `begin_rejit_compilation`
    ///
    /// On success `code` becomes resolvable as `(function, rejit)`.
    pub fn finish_rejit_compilation(
        &self,
        function: FunctionId,
        rejit: ReJitId,
        code: CodeRange,
        status: StatusCode,
        safe_to_block: bool,
    ) -> BrokerResult<CompileOutcome> {
        let inner = &self.inner;
        let outcome = inner.rejit.finish_compilation(rejit, function, status)?;

        let mut reported = status;
        let mut rejected = None;
        match &outcome {
            CompileOutcome::Activated { method, .. } => {
                match inner.code.insert(CompiledCodeRegion::new(function, rejit, code)) {
                    Ok(()) => {
                        info!(method = %method, function = %function, rejit = %rejit, range = %code, "revision active");
                    }
                    Err(e) => {
                        // An active revision must be resolvable by ip
                        reported = e.status();
                        warn!(method = %method, rejit = %rejit, range = %code, error = %e, "compiled code rejected");
                        inner.rejit.fail(rejit, reported)?;
                        self.report_rejit_error(*method, Some(function), reported);
                        rejected = Some(e);
                    }
                }
            }
            CompileOutcome::Failed { method, status } => {
                self.report_rejit_error(*method, Some(function), *status);
            }
            CompileOutcome::Discarded { method } => {
                debug!(method = %method, rejit = %rejit, "compiled code discarded after revert");
            }
        }

        inner.dispatcher.dispatch(
            EventCategory::Rejit,
            || (),
            |set, ()| match set.v4() {
                Some(v4) => v4.rejit_compilation_finished(function, rejit, reported, safe_to_block),
                None => Ok(()),
            },
        );
        match rejected {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// The engine could not process a revision outside of a compilation bracket
    pub fn rejit_failed(
        &self,
        rejit: ReJitId,
        function: Option<FunctionId>,
        status: StatusCode,
    ) -> BrokerResult<()> {
        let method = self.inner.rejit.fail(rejit, status)?;
        self.report_rejit_error(method, function, status);
        Ok(())
    }

    fn report_rejit_error(&self, method: MethodKey, function: Option<FunctionId>, status: StatusCode) {
        self.inner.dispatcher.stats().inc_rejit_errors();
        self.inner.dispatcher.dispatch(
            EventCategory::Rejit,
            || (),
            |set, ()| match set.v4() {
                Some(v4) => v4.rejit_error(method.module, method.token, function, status),
                None => Ok(()),
            },
        );
    }
}
