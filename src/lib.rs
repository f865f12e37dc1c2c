/*!
 * Profiler Broker Library
 *
 * In-process broker between a managed execution engine and one attached
 * observer: event-mask gating, versioned callback dispatch, object identity
 * across a moving collector, code region resolution, recompilation and
 * stack snapshots.
 */

pub mod broker;
pub mod callbacks;
pub mod code;
pub mod core;
pub mod dispatch;
pub mod mask;
pub mod monitoring;
pub mod objects;
pub mod rejit;
pub mod services;
pub mod stackwalk;

// Re-exports
pub use broker::{Broker, BrokerBuilder, EnterLeaveHooks, ProfilerInfo, RejitWithInliners};
pub use callbacks::{
    CallbackSet, CallbackVersion, EngineEvent, JitTarget, ProfilerCallback, ProfilerCallback2,
    ProfilerCallback3, ProfilerCallback4, ProfilerCallback5,
};
pub use code::{CodeRange, CodeRegionTable, CompiledCodeRegion};
pub use crate::core::{
    BatchStatus, BrokerConfig, BrokerError, BrokerResult, CallbackError, CallbackResult, SessionId,
};
pub use dispatch::{Dispatched, LifecycleState};
pub use mask::{AttachMode, EventCategory, EventMask, HighMonitorFlags, MonitorFlags, ObserverKind};
pub use monitoring::{init_tracing, DispatchStats};
pub use objects::{ManagedObjectRef, ObjectId, ObjectTracker};
pub use rejit::{FunctionControl, RejitFlags, RejitState};
pub use services::EngineServices;
pub use stackwalk::{FrameInfo, WalkControl, WalkFlags, WalkOutcome};
