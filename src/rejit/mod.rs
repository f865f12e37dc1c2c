/*!
 * Recompilation (ReJIT)
 *
 * Revision lifecycle, the parameter-supply capability and inlining data
 * used to find stale inlined copies of recompiled methods.
 */

pub mod control;
pub mod inlining;
pub mod manager;
pub mod types;

pub use control::FunctionControl;
pub use inlining::InlineTracker;
pub use manager::{CompileOutcome, RejitManager, SupplyOutcome};
pub use types::{
    CodegenFlags, InlinerEnumeration, RejitFlags, RejitParameters, RejitState, RevisionInfo,
};
