/*!
 * Callback Argument Types
 */

use crate::core::types::{FunctionId, MethodKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Method being compiled or inlined, with its metadata identity resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JitTarget {
    pub function: FunctionId,
    pub method: MethodKey,
}

impl JitTarget {
    pub const fn new(function: FunctionId, method: MethodKey) -> Self {
        Self { function, method }
    }
}

/// Result of a search for precompiled code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLookup {
    Found,
    NotFound,
}

/// Direction of a managed/unmanaged boundary crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Call,
    Return,
}

/// Highest callback interface an observer implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallbackVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
    V4 = 4,
    V5 = 5,
}

impl fmt::Display for CallbackVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", *self as u8)
    }
}
