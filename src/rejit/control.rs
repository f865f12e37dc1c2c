/*!
 * Function Control
 *
 * Capability handed to the observer while it supplies parameters for one
 * revision. Sealed when the callback returns; any later use fails.
 */

use super::types::{CodegenFlags, RejitParameters};
use crate::core::errors::BrokerError;
use crate::core::types::{BrokerResult, IlMapEntry, MethodKey, ReJitId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ControlInner {
    method: MethodKey,
    rejit: ReJitId,
    sealed: AtomicBool,
    params: Mutex<RejitParameters>,
}

/// Parameter-supply capability for one revision
///
/// Clones share state, so a clone retained past the callback is sealed too.
#[derive(Clone)]
pub struct FunctionControl {
    inner: Arc<ControlInner>,
}

impl FunctionControl {
    pub(crate) fn new(method: MethodKey, rejit: ReJitId) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                method,
                rejit,
                sealed: AtomicBool::new(false),
                params: Mutex::new(RejitParameters::default()),
            }),
        }
    }

    pub fn method(&self) -> MethodKey {
        self.inner.method
    }

    pub fn rejit_id(&self) -> ReJitId {
        self.inner.rejit
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::Acquire)
    }

    #[inline]
    fn check_open(&self) -> BrokerResult<()> {
        if self.is_sealed() {
            Err(BrokerError::CallbackSealed)
        } else {
            Ok(())
        }
    }

    /// Code generation flags for this revision only
    pub fn set_codegen_flags(&self, flags: CodegenFlags) -> BrokerResult<()> {
        self.check_open()?;
        self.inner.params.lock().codegen = flags;
        Ok(())
    }

    pub fn codegen_flags(&self) -> BrokerResult<CodegenFlags> {
        self.check_open()?;
        Ok(self.inner.params.lock().codegen)
    }

    /// Replacement method body; the bytes are copied
    pub fn set_il_function_body(&self, body: &[u8]) -> BrokerResult<()> {
        self.check_open()?;
        if body.is_empty() {
            return Err(BrokerError::invalid_argument("method body must not be empty"));
        }
        self.inner.params.lock().il_body = Some(Arc::from(body));
        Ok(())
    }

    /// Original-to-rewritten offset map; the entries are copied
    pub fn set_il_instrumented_code_map(&self, map: &[IlMapEntry]) -> BrokerResult<()> {
        self.check_open()?;
        self.inner.params.lock().il_map = map.to_vec();
        Ok(())
    }

    /// Seal and take what was supplied
    pub(crate) fn seal(&self) -> RejitParameters {
        self.inner.sealed.store(true, Ordering::Release);
        std::mem::take(&mut *self.inner.params.lock())
    }
}

impl std::fmt::Debug for FunctionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionControl")
            .field("method", &self.inner.method)
            .field("rejit", &self.inner.rejit)
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
