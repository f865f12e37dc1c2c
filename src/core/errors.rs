/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::StatusCode;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broker errors with serialization support
///
/// Every variant maps onto one of the status categories exposed across
/// the observer boundary (see [`BrokerError::status`]).
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum BrokerError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(broker::invalid_argument),
        help("Check identities and batch array lengths passed to the call.")
    )]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    #[diagnostic(
        code(broker::invalid_state),
        help("The call was made at a point in the lifecycle where it is not allowed.")
    )]
    InvalidState(String),

    /// Late change to an immutable mask bit. Reported with its own status
    /// code rather than the generic wrong-state one, but still classified
    /// as an ordering violation.
    #[error("Immutable event mask bits cannot change after initialization: {0}")]
    #[diagnostic(
        code(broker::immutable_flags),
        help("Set immutable categories from the initialize callback only.")
    )]
    ImmutableFlags(String),

    #[error("Event mask bits not allowed for this observer: {0}")]
    #[diagnostic(
        code(broker::unsupported_for_attach),
        help("Observers loaded into a running process may only enable attach-safe categories.")
    )]
    UnsupportedForAttach(String),

    #[error("Capability used outside of its callback")]
    #[diagnostic(
        code(broker::callback_sealed),
        help("Capability objects are only valid while the callback that received them runs.")
    )]
    CallbackSealed,

    #[error("A garbage collection is in progress")]
    #[diagnostic(
        code(broker::collection_in_progress),
        help("Object identities can be resolved again once moved/survived notifications are processed.")
    )]
    CollectionInProgress,

    #[error("Not available: {0}")]
    #[diagnostic(
        code(broker::not_available),
        help("This operation is not supported by this engine build or configuration.")
    )]
    NotAvailable(String),

    #[error("Insufficient buffer: {required} entries required, {provided} provided")]
    #[diagnostic(
        code(broker::insufficient_buffer),
        help("Query the required length first, then call again with a large enough buffer.")
    )]
    InsufficientBuffer { required: usize, provided: usize },

    #[error("Object reference {0:#x} is stale")]
    #[diagnostic(
        code(broker::stale_object_ref),
        help("The collector may have moved this object. Remap it through the last cycle's notifications.")
    )]
    StaleObjectRef(usize),

    #[error("Object {0:#x} was reclaimed")]
    #[diagnostic(code(broker::object_reclaimed))]
    ObjectReclaimed(usize),

    #[error("An observer is already attached to this process")]
    #[diagnostic(
        code(broker::already_attached),
        help("Only one observer may be attached per process. Detach the current one first.")
    )]
    AlreadyAttached,

    #[error("No observer is attached")]
    #[diagnostic(code(broker::not_attached))]
    NotAttached,

    #[error("Several revisions are resident for function {0:#x}; a revision id is required")]
    #[diagnostic(
        code(broker::ambiguous_revision),
        help("Pass the ReJIT id obtained from function_from_ip or rejit_ids.")
    )]
    AmbiguousRevision(u64),

    #[error("Not found: {0}")]
    #[diagnostic(code(broker::not_found))]
    NotFound(String),

    #[error("Recompilation was not enabled at initialization")]
    #[diagnostic(
        code(broker::rejit_not_enabled),
        help("Set the ENABLE_REJIT event mask bit from the initialize callback.")
    )]
    RejitNotEnabled,

    #[error("Engine error: {0}")]
    #[diagnostic(code(broker::engine))]
    Engine(String),
}

impl BrokerError {
    /// Numeric status reported across the observer boundary
    pub fn status(&self) -> StatusCode {
        let code: u32 = match self {
            BrokerError::InvalidArgument(_) => 0x8007_0057,
            BrokerError::InvalidState(_) => 0x8013_1360,
            BrokerError::ImmutableFlags(_) => 0x8013_1367,
            BrokerError::UnsupportedForAttach(_) => 0x8013_1372,
            BrokerError::CallbackSealed => 0x8013_1373,
            BrokerError::CollectionInProgress => 0x8013_1374,
            BrokerError::NotAvailable(_) => 0x8013_1375,
            BrokerError::InsufficientBuffer { .. } => 0x8007_007A,
            BrokerError::StaleObjectRef(_) => 0x8013_1376,
            BrokerError::ObjectReclaimed(_) => 0x8013_1377,
            BrokerError::AlreadyAttached => 0x8013_1378,
            BrokerError::NotAttached => 0x8013_1379,
            BrokerError::AmbiguousRevision(_) => 0x8013_137A,
            BrokerError::NotFound(_) => 0x8013_137B,
            BrokerError::RejitNotEnabled => 0x8013_137C,
            BrokerError::Engine(_) => 0x8000_4005,
        };
        StatusCode(code as i32)
    }

    /// Ordering violations: the call itself was well-formed but made at the wrong time
    pub fn is_ordering_violation(&self) -> bool {
        matches!(
            self,
            BrokerError::InvalidState(_)
                | BrokerError::ImmutableFlags(_)
                | BrokerError::UnsupportedForAttach(_)
                | BrokerError::CallbackSealed
                | BrokerError::CollectionInProgress
        )
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        BrokerError::InvalidState(msg.into())
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        BrokerError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_available(msg: impl Into<String>) -> Self {
        BrokerError::NotAvailable(msg.into())
    }
}

/// Failure returned by an observer callback
///
/// Never propagated into engine control flow: notification failures are
/// logged and counted, gate failures fall back to the conservative default.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("callback failed with status {status}: {message}")]
pub struct CallbackError {
    pub status: StatusCode,
    pub message: String,
}

impl CallbackError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FAIL, message)
    }
}

impl From<BrokerError> for CallbackError {
    fn from(err: BrokerError) -> Self {
        CallbackError::new(err.status(), err.to_string())
    }
}

/// Result type returned by observer callbacks
pub type CallbackResult<T = ()> = Result<T, CallbackError>;
