/*!
 * Event Mask Flags
 *
 * Two 32-bit words of event categories. Bit positions are fixed forever:
 * new categories are appended as new high-word bits, never renumbered.
 */

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Low word of the event mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MonitorFlags: u32 {
        const NONE = 0;
        const FUNCTION_UNLOADS = 0x0000_0001;
        const CLASS_LOADS = 0x0000_0002;
        const MODULE_LOADS = 0x0000_0004;
        const ASSEMBLY_LOADS = 0x0000_0008;
        const APPDOMAIN_LOADS = 0x0000_0010;
        const JIT_COMPILATION = 0x0000_0020;
        const EXCEPTIONS = 0x0000_0040;
        const GC = 0x0000_0080;
        const OBJECT_ALLOCATED = 0x0000_0100;
        const THREADS = 0x0000_0200;
        const REMOTING = 0x0000_0400;
        const CODE_TRANSITIONS = 0x0000_0800;
        const ENTERLEAVE = 0x0000_1000;
        const CCW = 0x0000_2000;
        const REMOTING_COOKIE = 0x0000_4000 | Self::REMOTING.bits();
        const REMOTING_ASYNC = 0x0000_8000 | Self::REMOTING.bits();
        const SUSPENDS = 0x0001_0000;
        const CACHE_SEARCHES = 0x0002_0000;
        const ENABLE_REJIT = 0x0004_0000;
        const ENABLE_INPROC_DEBUGGING = 0x0008_0000;
        const ENABLE_JIT_MAPS = 0x0010_0000;
        const DISABLE_INLINING = 0x0020_0000;
        const DISABLE_OPTIMIZATIONS = 0x0040_0000;
        const ENABLE_OBJECT_ALLOCATED = 0x0080_0000;
        const CLR_EXCEPTIONS = 0x0100_0000;
        const ENABLE_FUNCTION_ARGS = 0x0200_0000;
        const ENABLE_FUNCTION_RETVAL = 0x0400_0000;
        const ENABLE_FRAME_INFO = 0x0800_0000;
        const ENABLE_STACK_SNAPSHOT = 0x1000_0000;
        const USE_PROFILE_IMAGES = 0x2000_0000;
        const DISABLE_TRANSPARENCY_CHECKS = 0x4000_0000;
        const DISABLE_ALL_PRECOMPILED_IMAGES = 0x8000_0000;

        // Composites: fixed unions of the bits above

        const MONITOR_ALL = Self::FUNCTION_UNLOADS.bits()
            | Self::CLASS_LOADS.bits()
            | Self::MODULE_LOADS.bits()
            | Self::ASSEMBLY_LOADS.bits()
            | Self::APPDOMAIN_LOADS.bits()
            | Self::JIT_COMPILATION.bits()
            | Self::EXCEPTIONS.bits()
            | Self::GC.bits()
            | Self::OBJECT_ALLOCATED.bits()
            | Self::THREADS.bits()
            | Self::REMOTING.bits()
            | Self::CODE_TRANSITIONS.bits()
            | Self::ENTERLEAVE.bits()
            | Self::CCW.bits()
            | Self::REMOTING_COOKIE.bits()
            | Self::REMOTING_ASYNC.bits()
            | Self::SUSPENDS.bits()
            | Self::CACHE_SEARCHES.bits()
            | Self::CLR_EXCEPTIONS.bits();

        const REQUIRE_PROFILE_IMAGE = Self::USE_PROFILE_IMAGES.bits()
            | Self::CODE_TRANSITIONS.bits()
            | Self::ENTERLEAVE.bits();

        const ALLOWABLE_AFTER_ATTACH = Self::THREADS.bits()
            | Self::MODULE_LOADS.bits()
            | Self::ASSEMBLY_LOADS.bits()
            | Self::APPDOMAIN_LOADS.bits()
            | Self::CLASS_LOADS.bits()
            | Self::GC.bits()
            | Self::SUSPENDS.bits()
            | Self::EXCEPTIONS.bits()
            | Self::JIT_COMPILATION.bits()
            | Self::ENABLE_REJIT.bits()
            | Self::ENABLE_STACK_SNAPSHOT.bits();

        const ALLOWABLE_NOTIFICATION_PROFILER = Self::FUNCTION_UNLOADS.bits()
            | Self::CLASS_LOADS.bits()
            | Self::MODULE_LOADS.bits()
            | Self::ASSEMBLY_LOADS.bits()
            | Self::APPDOMAIN_LOADS.bits()
            | Self::JIT_COMPILATION.bits()
            | Self::EXCEPTIONS.bits()
            | Self::OBJECT_ALLOCATED.bits()
            | Self::THREADS.bits()
            | Self::CODE_TRANSITIONS.bits()
            | Self::CCW.bits()
            | Self::SUSPENDS.bits()
            | Self::CACHE_SEARCHES.bits()
            | Self::DISABLE_INLINING.bits()
            | Self::DISABLE_OPTIMIZATIONS.bits()
            | Self::ENABLE_OBJECT_ALLOCATED.bits()
            | Self::GC.bits()
            | Self::ENABLE_STACK_SNAPSHOT.bits();

        const MONITOR_IMMUTABLE = Self::CODE_TRANSITIONS.bits()
            | Self::REMOTING.bits()
            | Self::REMOTING_COOKIE.bits()
            | Self::REMOTING_ASYNC.bits()
            | Self::ENABLE_REJIT.bits()
            | Self::ENABLE_INPROC_DEBUGGING.bits()
            | Self::ENABLE_JIT_MAPS.bits()
            | Self::DISABLE_OPTIMIZATIONS.bits()
            | Self::DISABLE_INLINING.bits()
            | Self::ENABLE_OBJECT_ALLOCATED.bits()
            | Self::ENABLE_FUNCTION_ARGS.bits()
            | Self::ENABLE_FUNCTION_RETVAL.bits()
            | Self::ENABLE_FRAME_INFO.bits()
            | Self::USE_PROFILE_IMAGES.bits()
            | Self::DISABLE_TRANSPARENCY_CHECKS.bits()
            | Self::DISABLE_ALL_PRECOMPILED_IMAGES.bits();
    }
}

bitflags! {
    /// High word of the event mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct HighMonitorFlags: u32 {
        const NONE = 0;
        const ADD_ASSEMBLY_REFERENCES = 0x0000_0001;
        const IN_MEMORY_SYMBOLS_UPDATED = 0x0000_0002;
        const DISABLE_TIERED_COMPILATION = 0x0000_0004;
        const BASIC_GC = 0x0000_0008;
        const GC_MOVED_OBJECTS = 0x0000_0010;
        const LARGE_OBJECT_ALLOCATED = 0x0000_0040;
        const PINNED_OBJECT_ALLOCATED = 0x0000_0100;
        const DYNAMIC_FUNCTION_UNLOADS = 0x0000_0200;

        const ALLOWABLE_AFTER_ATTACH = Self::IN_MEMORY_SYMBOLS_UPDATED.bits()
            | Self::BASIC_GC.bits()
            | Self::GC_MOVED_OBJECTS.bits()
            | Self::LARGE_OBJECT_ALLOCATED.bits()
            | Self::PINNED_OBJECT_ALLOCATED.bits()
            | Self::DYNAMIC_FUNCTION_UNLOADS.bits();

        const ALLOWABLE_NOTIFICATION_PROFILER = Self::IN_MEMORY_SYMBOLS_UPDATED.bits()
            | Self::DISABLE_TIERED_COMPILATION.bits()
            | Self::BASIC_GC.bits()
            | Self::GC_MOVED_OBJECTS.bits()
            | Self::LARGE_OBJECT_ALLOCATED.bits()
            | Self::PINNED_OBJECT_ALLOCATED.bits()
            | Self::DYNAMIC_FUNCTION_UNLOADS.bits();

        const MONITOR_IMMUTABLE = Self::DISABLE_TIERED_COMPILATION.bits();
    }
}

/// The complete event mask: both words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventMask {
    pub low: MonitorFlags,
    pub high: HighMonitorFlags,
}

impl EventMask {
    pub const EMPTY: EventMask = EventMask {
        low: MonitorFlags::empty(),
        high: HighMonitorFlags::empty(),
    };

    /// Bits that cannot change once the initialize callback has returned
    pub const IMMUTABLE: EventMask = EventMask {
        low: MonitorFlags::MONITOR_IMMUTABLE,
        high: HighMonitorFlags::MONITOR_IMMUTABLE,
    };

    /// Bits an observer loaded into a running process may enable
    pub const ALLOWABLE_AFTER_ATTACH: EventMask = EventMask {
        low: MonitorFlags::ALLOWABLE_AFTER_ATTACH,
        high: HighMonitorFlags::ALLOWABLE_AFTER_ATTACH,
    };

    /// Bits a notification-only observer may enable
    pub const ALLOWABLE_NOTIFICATION_PROFILER: EventMask = EventMask {
        low: MonitorFlags::ALLOWABLE_NOTIFICATION_PROFILER,
        high: HighMonitorFlags::ALLOWABLE_NOTIFICATION_PROFILER,
    };

    #[inline]
    pub const fn new(low: MonitorFlags, high: HighMonitorFlags) -> Self {
        Self { low, high }
    }

    #[inline]
    pub const fn low(low: MonitorFlags) -> Self {
        Self {
            low,
            high: HighMonitorFlags::empty(),
        }
    }

    #[inline]
    pub const fn high(high: HighMonitorFlags) -> Self {
        Self {
            low: MonitorFlags::empty(),
            high,
        }
    }

    /// Pack into the single word stored by the registry
    #[inline]
    pub const fn to_bits(self) -> u64 {
        (self.low.bits() as u64) | ((self.high.bits() as u64) << 32)
    }

    /// Unpack from the registry word, keeping unknown bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            low: MonitorFlags::from_bits_retain(bits as u32),
            high: HighMonitorFlags::from_bits_retain((bits >> 32) as u32),
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.to_bits() == 0
    }

    #[inline]
    pub const fn union(self, other: EventMask) -> EventMask {
        EventMask::from_bits(self.to_bits() | other.to_bits())
    }

    #[inline]
    pub const fn intersection(self, other: EventMask) -> EventMask {
        EventMask::from_bits(self.to_bits() & other.to_bits())
    }

    #[inline]
    pub const fn difference(self, other: EventMask) -> EventMask {
        EventMask::from_bits(self.to_bits() & !other.to_bits())
    }

    /// Bits that differ between two masks
    #[inline]
    pub const fn changed(self, other: EventMask) -> EventMask {
        EventMask::from_bits(self.to_bits() ^ other.to_bits())
    }

    #[inline]
    pub const fn contains(self, other: EventMask) -> bool {
        self.to_bits() & other.to_bits() == other.to_bits()
    }

    #[inline]
    pub const fn intersects(self, other: EventMask) -> bool {
        self.to_bits() & other.to_bits() != 0
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<MonitorFlags> for EventMask {
    fn from(low: MonitorFlags) -> Self {
        EventMask::low(low)
    }
}

impl From<HighMonitorFlags> for EventMask {
    fn from(high: HighMonitorFlags) -> Self {
        EventMask::high(high)
    }
}

impl std::ops::BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        self.union(rhs)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}:{:#010x}", self.high.bits(), self.low.bits())
    }
}
