/*!
 * Core Module
 * Fundamental broker types, configuration and error handling
 */

pub mod batch;
pub mod config;
pub mod errors;
pub mod guards;
pub mod id;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use batch::BatchStatus;
pub use config::BrokerConfig;
pub use errors::*;
pub use guards::{CounterGuard, Guard, OnDrop};
pub use id::{IdGenerator, SessionId};
pub use types::*;
