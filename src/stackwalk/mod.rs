/*!
 * Stack Snapshot Walker
 */

pub mod types;
pub mod walker;

pub use types::{FrameFunction, FrameInfo, WalkControl, WalkFlags, WalkOutcome};
pub use walker::StackWalker;
