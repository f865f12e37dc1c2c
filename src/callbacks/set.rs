/*!
 * Callback Set
 * An attached observer with its interface version resolved once at attach
 */

use super::traits::{
    ProfilerCallback, ProfilerCallback2, ProfilerCallback3, ProfilerCallback4, ProfilerCallback5,
};
use super::types::CallbackVersion;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct CallbackSet {
    observer: Arc<dyn ProfilerCallback>,
    version: CallbackVersion,
}

impl CallbackSet {
    pub fn new(observer: Arc<dyn ProfilerCallback>) -> Self {
        let version = if observer.as_v5().is_some() {
            CallbackVersion::V5
        } else if observer.as_v4().is_some() {
            CallbackVersion::V4
        } else if observer.as_v3().is_some() {
            CallbackVersion::V3
        } else if observer.as_v2().is_some() {
            CallbackVersion::V2
        } else {
            CallbackVersion::V1
        };
        Self { observer, version }
    }

    #[inline]
    pub fn version(&self) -> CallbackVersion {
        self.version
    }

    #[inline]
    pub fn supports(&self, version: CallbackVersion) -> bool {
        self.version >= version
    }

    #[inline]
    pub fn v1(&self) -> &dyn ProfilerCallback {
        &*self.observer
    }

    #[inline]
    pub fn v2(&self) -> Option<&dyn ProfilerCallback2> {
        self.observer.as_v2()
    }

    #[inline]
    pub fn v3(&self) -> Option<&dyn ProfilerCallback3> {
        self.observer.as_v3()
    }

    #[inline]
    pub fn v4(&self) -> Option<&dyn ProfilerCallback4> {
        self.observer.as_v4()
    }

    #[inline]
    pub fn v5(&self) -> Option<&dyn ProfilerCallback5> {
        self.observer.as_v5()
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
