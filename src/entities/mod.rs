//! sea-orm entities for the modular BOM schema.

pub mod bom_line;
pub mod bom_version;
pub mod drawing;
pub mod material;
pub mod supplier;
pub mod unit;

pub use material::MaterialAttribute;
