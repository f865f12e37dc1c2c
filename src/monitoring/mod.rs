/*!
 * Monitoring
 * Structured tracing and lock-free dispatch statistics
 */

mod stats;
mod tracer;

pub use stats::{AtomicDispatchStats, DispatchStats};
pub use tracer::{generate_trace_id, init_tracing, init_tracing_with, span_operation, OperationSpan};
