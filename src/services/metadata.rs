/*!
 * Metadata Provider
 * Read-only engine queries consumed by the observer's info surface
 */

use crate::core::types::{
    Address, AppDomainId, AssemblyId, BrokerResult, ClassId, FunctionId, MdToken, ModuleId,
};
use crate::objects::ObjectId;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

bitflags! {
    /// Properties of a loaded module
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ModuleFlags: u32 {
        /// Contains precompiled native code
        const PRECOMPILED = 0x1;
        /// Precompiled code carries inlining records
        const INLINE_TRACKING = 0x2;
        /// Emitted at runtime
        const DYNAMIC = 0x4;
    }
}

impl ModuleFlags {
    /// Precompiled code whose inlining decisions are unknown to the broker
    pub fn lacks_inline_tracking(self) -> bool {
        self.contains(ModuleFlags::PRECOMPILED) && !self.contains(ModuleFlags::INLINE_TRACKING)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub module: ModuleId,
    pub token: MdToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub class: ClassId,
    pub module: ModuleId,
    pub token: MdToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub base_address: Address,
    pub name: String,
    pub assembly: AssemblyId,
    pub flags: ModuleFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyInfo {
    pub name: String,
    pub app_domain: AppDomainId,
    pub manifest_module: ModuleId,
}

/// Raw metadata access scoped to one module
pub trait MetadataImport: Send + Sync {
    fn module(&self) -> ModuleId;

    /// Name of a method definition
    fn method_name(&self, token: MdToken) -> BrokerResult<String>;

    /// Name of a type definition
    fn type_name(&self, token: MdToken) -> BrokerResult<String>;

    /// Signature blob of a method definition
    fn method_signature(&self, token: MdToken) -> BrokerResult<Vec<u8>>;
}

/// Object, type, method, module and assembly resolution
pub trait MetadataProvider: Send + Sync {
    fn class_of_object(&self, object: ObjectId) -> BrokerResult<ClassId>;

    fn class_info(&self, class: ClassId) -> BrokerResult<ClassInfo>;

    fn function_info(&self, function: FunctionId) -> BrokerResult<FunctionInfo>;

    fn module_info(&self, module: ModuleId) -> BrokerResult<ModuleInfo>;

    fn assembly_info(&self, assembly: AssemblyId) -> BrokerResult<AssemblyInfo>;

    fn metadata_importer(&self, module: ModuleId) -> BrokerResult<Arc<dyn MetadataImport>>;
}
