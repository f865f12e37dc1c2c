/*!
 * Object Identity Types
 * Epoch-tagged object references and garbage collection vocabulary
 */

use crate::core::types::{Address, ClassId, Size};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw identity of a heap object: its address in the current epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub Address);

impl ObjectId {
    #[inline]
    pub const fn address(self) -> Address {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Object identity tagged with the collection epoch it was reported in
///
/// Resolving a reference from an older epoch fails with `StaleObjectRef`
/// instead of silently reading whatever now lives at that address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    pub id: ObjectId,
    pub epoch: u32,
}

impl ManagedObjectRef {
    #[inline]
    pub const fn new(id: ObjectId, epoch: u32) -> Self {
        Self { id, epoch }
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.epoch)
    }
}

/// Heap segment an object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Gen0,
    Gen1,
    Gen2,
    LargeObjectHeap,
    PinnedObjectHeap,
}

impl Generation {
    /// Generation after surviving a collection
    ///
    /// Large and pinned objects are not promoted.
    pub const fn promoted(self) -> Generation {
        match self {
            Generation::Gen0 => Generation::Gen1,
            Generation::Gen1 | Generation::Gen2 => Generation::Gen2,
            other => other,
        }
    }

    pub const fn as_set(self) -> GenerationSet {
        match self {
            Generation::Gen0 => GenerationSet::GEN0,
            Generation::Gen1 => GenerationSet::GEN1,
            Generation::Gen2 => GenerationSet::GEN2,
            Generation::LargeObjectHeap => GenerationSet::LARGE_OBJECT_HEAP,
            Generation::PinnedObjectHeap => GenerationSet::PINNED_OBJECT_HEAP,
        }
    }
}

bitflags! {
    /// Generations collected by one cycle
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct GenerationSet: u8 {
        const GEN0 = 0x01;
        const GEN1 = 0x02;
        const GEN2 = 0x04;
        const LARGE_OBJECT_HEAP = 0x08;
        const PINNED_OBJECT_HEAP = 0x10;

        /// Full blocking collection
        const ALL = Self::GEN0.bits() | Self::GEN1.bits() | Self::GEN2.bits()
            | Self::LARGE_OBJECT_HEAP.bits() | Self::PINNED_OBJECT_HEAP.bits();
    }
}

impl GenerationSet {
    /// Generations collected when collecting up to and including `max`
    pub fn up_to(max: Generation) -> GenerationSet {
        match max {
            Generation::Gen0 => GenerationSet::GEN0,
            Generation::Gen1 => GenerationSet::GEN0 | GenerationSet::GEN1,
            _ => GenerationSet::ALL,
        }
    }

    #[inline]
    pub fn collects(self, generation: Generation) -> bool {
        self.contains(generation.as_set())
    }
}

/// Why a collection was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcReason {
    /// Requested explicitly (including observer-forced collections)
    Induced,
    Other,
}

/// Why the runtime is being suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    Other,
    Gc,
    AppDomainShutdown,
    CodePitching,
    Shutdown,
    InprocDebugger,
    GcPrep,
    Rejit,
}

/// Phase of the collection protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcPhase {
    Idle,
    SuspendRequested,
    Suspended,
    CollectionStarted,
    CollectionFinished,
    ResumeStarted,
}

impl GcPhase {
    /// Identity-bearing notifications (moves, survivors, roots) are only
    /// legal between collection start and finish.
    #[inline]
    pub fn accepts_heap_reports(self) -> bool {
        matches!(self, GcPhase::CollectionStarted)
    }
}

/// Where a root reference was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    Stack,
    Finalizer,
    Handle,
    Other,
}

bitflags! {
    /// Qualifiers on a root reference
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RootFlags: u32 {
        const PINNING = 0x1;
        const WEAK_REF = 0x2;
        const INTERIOR = 0x4;
        const REFCOUNTED = 0x8;
    }
}

/// Annotated root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootReference {
    pub object: ObjectId,
    pub kind: RootKind,
    pub flags: RootFlags,
    /// Engine-defined identity of the root slot (frame, handle, queue entry)
    pub root_id: usize,
}

/// Why an object was queued for finalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizerFlags {
    None,
    Critical,
}

/// Broker-side record of a live object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub class: ClassId,
    pub size: Size,
    pub generation: Generation,
}

/// Outcome of one collection cycle as seen by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcCycleSummary {
    pub cycle: u64,
    pub generations: GenerationSet,
    pub reason: GcReason,
    /// Epoch in force after the cycle
    pub epoch: u32,
    pub moved_ranges: usize,
    pub moved_objects: usize,
    pub survived_objects: usize,
    pub promoted_objects: usize,
    pub reclaimed_objects: usize,
    pub roots_reported: usize,
}
