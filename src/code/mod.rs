/*!
 * Code Regions
 * Resident compiled bodies and instruction-pointer resolution
 */

pub mod region;
pub mod table;

pub use region::{CodeRange, CompiledCodeRegion};
pub use table::CodeRegionTable;
