/*!
 * Engine Services
 *
 * Collaborators the broker reaches through traits: metadata resolution,
 * thread control, engine mutation and environment access. Missing
 * providers surface as `NotAvailable` at the call site.
 */

pub mod control;
pub mod environment;
pub mod metadata;
pub mod threads;

pub use control::EngineControl;
pub use environment::{EnvironmentAccess, ProcessEnvironment};
pub use metadata::{
    AssemblyInfo, ClassInfo, FunctionInfo, MetadataImport, MetadataProvider, ModuleFlags,
    ModuleInfo,
};
pub use threads::{RawFrame, ThreadControl};

/// Full engine surface in one object
///
/// Blanket-implemented for anything providing every collaborator, so a
/// single engine object can be registered with `BrokerBuilder::with_engine`.
pub trait EngineServices: MetadataProvider + ThreadControl + EngineControl {}

impl<T> EngineServices for T where T: MetadataProvider + ThreadControl + EngineControl {}
