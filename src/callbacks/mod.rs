/*!
 * Observer Callbacks
 * Versioned callback interfaces and the events delivered through them
 */

pub mod events;
pub mod set;
pub mod traits;
pub mod types;

pub use events::EngineEvent;
pub use set::CallbackSet;
pub use traits::{
    ProfilerCallback, ProfilerCallback2, ProfilerCallback3, ProfilerCallback4, ProfilerCallback5,
};
pub use types::{CacheLookup, CallbackVersion, JitTarget, TransitionReason};
