/*!
 * Event Mask
 *
 * Enabled-event bitset, category gates and the per-observer registry
 */

pub mod category;
pub mod flags;
pub mod registry;

pub use category::{EventCategory, MutationKind};
pub use flags::{EventMask, HighMonitorFlags, MonitorFlags};
pub use registry::{AttachMode, EventMaskRegistry, ObserverKind};
