/*!
 * Broker Limits and Constants
 *
 * Centralized location for thresholds and fixed sizes.
 * Performance-critical constants are marked with [PERF].
 */

use std::time::Duration;

// =============================================================================
// DISPATCH
// =============================================================================

/// Callbacks slower than this are logged as slow (default)
pub const SLOW_CALLBACK_THRESHOLD: Duration = Duration::from_millis(10);

/// Broker-internal operations (GC cycle, walk, recompilation) slower than this are logged
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_millis(100);

// =============================================================================
// DETACH
// =============================================================================

/// Suggested interval between engine detach polls
pub const DEFAULT_DETACH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound accepted for an observer's expected-completion hint
pub const MAX_DETACH_COMPLETION_HINT: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// GARBAGE COLLECTION
// =============================================================================

/// Largest range length representable by the narrow batch shape
pub const NARROW_RANGE_MAX: usize = u32::MAX as usize;

/// Initial capacity of per-cycle root dedup sets
/// [PERF] Avoids rehashing during the first root batches of a cycle
pub const ROOT_DEDUP_INITIAL_CAPACITY: usize = 256;

// =============================================================================
// STACK WALKS
// =============================================================================

/// Default bound on frames visited by a single walk
pub const DEFAULT_MAX_WALK_DEPTH: usize = 16 * 1024;

// =============================================================================
// RECOMPILATION
// =============================================================================

/// Upper bound on methods accepted in one recompilation batch
pub const MAX_REJIT_BATCH: usize = 64 * 1024;
