// Modular BOM facade used by the HTTP layer and the CLI
pub mod bom;

// Tree resolution engine
pub mod bom_tree;
