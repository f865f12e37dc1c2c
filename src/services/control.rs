/*!
 * Engine Control
 * Mutations the observer may request from the engine
 */

use crate::core::types::{BrokerResult, ThreadId};

pub trait EngineControl: Send + Sync {
    /// Run a full blocking collection
    fn force_gc(&self) -> BrokerResult<()>;

    /// Create a thread reserved for in-process debugging instrumentation
    fn request_instrumented_thread(&self) -> BrokerResult<ThreadId>;
}
