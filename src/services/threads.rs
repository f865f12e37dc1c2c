/*!
 * Thread Control
 * Engine thread identity, suspension and stack capture
 */

use crate::core::types::{Address, BrokerResult, ThreadId};

/// One captured frame, innermost first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub ip: Address,
    /// Engine-defined frame metadata handle
    pub frame_token: u64,
    /// Raw register context; empty unless requested
    pub context: Vec<u8>,
}

/// Thread primitives the broker calls into
///
/// The broker never suspends threads on its own: cross-thread walks go
/// through `suspend`/`resume` here.
pub trait ThreadControl: Send + Sync {
    /// Engine identity of the calling thread, if it is a managed thread
    fn current_thread(&self) -> Option<ThreadId>;

    /// Whether this engine build can walk stacks at all
    fn supports_stack_walks(&self) -> bool {
        true
    }

    fn suspend(&self, thread: ThreadId) -> BrokerResult<()>;

    fn resume(&self, thread: ThreadId) -> BrokerResult<()>;

    /// Capture the frames of a thread that is either the caller or suspended
    fn capture_stack(
        &self,
        thread: ThreadId,
        seed_context: Option<&[u8]>,
        with_context: bool,
    ) -> BrokerResult<Vec<RawFrame>>;
}
