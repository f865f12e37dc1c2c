/*!
 * Object Identity
 *
 * Epoch-tagged object references, range batches and the collection-cycle
 * tracker that keeps identities correct across a moving collector.
 */

pub mod batch;
pub mod tracker;
pub mod types;

pub use batch::{
    MovedRangeBatch, MovedRanges, NarrowMovedRangeBatch, NarrowSurvivedRangeBatch,
    RangeLength, SurvivedRangeBatch, SurvivedRanges,
};
pub use tracker::ObjectTracker;
pub use types::*;
