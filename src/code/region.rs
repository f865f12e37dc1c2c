/*!
 * Compiled Code Regions
 */

use crate::core::types::{Address, FunctionId, ReJitId, Size};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contiguous native code range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeRange {
    pub start: Address,
    pub size: Size,
}

impl CodeRange {
    #[inline]
    pub const fn new(start: Address, size: Size) -> Self {
        Self { start, size }
    }

    /// One past the last byte
    #[inline]
    pub fn end(&self) -> Address {
        self.start.saturating_add(self.size)
    }

    #[inline]
    pub fn contains(&self, ip: Address) -> bool {
        ip >= self.start && ip < self.end()
    }

    #[inline]
    pub fn overlaps(&self, other: &CodeRange) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end())
    }
}

/// One resident compiled body: a revision of a function at a code range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledCodeRegion {
    pub function: FunctionId,
    pub rejit: ReJitId,
    pub range: CodeRange,
}

impl CompiledCodeRegion {
    pub const fn new(function: FunctionId, rejit: ReJitId, range: CodeRange) -> Self {
        Self {
            function,
            rejit,
            range,
        }
    }

    #[inline]
    pub fn start(&self) -> Address {
        self.range.start
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.range.size
    }

    #[inline]
    pub fn contains(&self, ip: Address) -> bool {
        self.range.contains(ip)
    }
}
