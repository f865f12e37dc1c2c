/*!
 * Core Types
 * Opaque engine identities shared across the broker
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw instruction pointer or heap address
pub type Address = usize;

/// Size type for memory and code ranges
pub type Size = usize;

/// Common result type for broker operations
pub type BrokerResult<T> = Result<T, super::errors::BrokerError>;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }
    };
}

opaque_id!(
    /// Identity of one compiled instantiation of a method
    FunctionId(u64)
);
opaque_id!(
    /// Identity of a loaded type
    ClassId(u64)
);
opaque_id!(
    /// Identity of a loaded module
    ModuleId(u64)
);
opaque_id!(
    /// Identity of a loaded assembly
    AssemblyId(u64)
);
opaque_id!(
    /// Identity of an isolation domain
    AppDomainId(u64)
);
opaque_id!(
    /// Engine-managed thread identity
    ThreadId(u64)
);
opaque_id!(
    /// Identity of a GC handle
    GcHandleId(u64)
);

/// Metadata token scoped to a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MdToken(pub u32);

impl fmt::Display for MdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Revision identity of a compiled method body
///
/// `ReJitId::ORIGINAL` names the code produced by the first compilation;
/// every recompilation request is assigned a fresh, never reused id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReJitId(pub u64);

impl ReJitId {
    pub const ORIGINAL: ReJitId = ReJitId(0);

    #[inline]
    pub fn is_original(self) -> bool {
        self == Self::ORIGINAL
    }
}

impl fmt::Display for ReJitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A method named by its defining module and token
///
/// One `MethodKey` may correspond to several `FunctionId`s (generic
/// instantiations); recompilation is requested per `MethodKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodKey {
    pub module: ModuleId,
    pub token: MdToken,
}

impl MethodKey {
    #[inline]
    pub const fn new(module: ModuleId, token: MdToken) -> Self {
        Self { module, token }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.token)
    }
}

/// Status code carried by engine results (compilation outcome, errors)
///
/// Non-negative values are success, negative values are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);
    pub const FAIL: StatusCode = StatusCode(-1);

    #[inline]
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn is_failure(self) -> bool {
        self.0 < 0
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::OK
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

/// Entry of an IL offset to native offset map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlToNativeEntry {
    pub il_offset: u32,
    pub native_start: u32,
    pub native_end: u32,
}

/// Entry of an original-to-rewritten IL offset map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlMapEntry {
    pub old_offset: u32,
    pub new_offset: u32,
    pub accurate: bool,
}
