/*!
 * Synchronization Primitives
 */

pub mod rcu;

pub use rcu::RcuCell;
