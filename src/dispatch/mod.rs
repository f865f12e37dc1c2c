/*!
 * Dispatch Module
 * Event delivery and observer lifecycle
 */

pub mod dispatcher;
pub mod lifecycle;

pub use dispatcher::{Dispatched, Dispatcher};
pub use lifecycle::{slot_occupied, Lifecycle, LifecycleState, SlotClaim};
