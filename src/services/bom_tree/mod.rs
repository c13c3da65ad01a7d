//! BOM tree resolution engine.
//!
//! Structures are stored per material: a line names a component material and
//! the component's own structure is whatever version of it is active when
//! the tree is read. [`graph`] loads that graph into a snapshot, [`traversal`]
//! walks it once, and the remaining modules are consumers of the walk or the
//! inverse direction ([`import`]).

pub mod expand;
pub mod flatten;
pub mod graph;
pub mod import;
pub mod manifest;
pub mod ordering;
pub mod path;
pub mod tabular;
pub mod traversal;
pub mod versions;
pub mod xlsx;

pub use expand::{expand, BomNode};
pub use flatten::{flatten, outline_level};
pub use graph::{BomGraph, BomRepository, LoadOptions, MaterialRecord, SeaOrmBomRepository};
pub use import::{import_rows, import_scope, ImportRow, ImportSummary};
pub use manifest::{collect_manifest, ManifestEntry, ManifestSource};
pub use ordering::cmp_position_codes;
pub use tabular::{CsvSheetRenderer, SheetRenderer, SheetRow};
pub use traversal::{walk, BomVisitor, NodeContext};
pub use xlsx::XlsxSheetRenderer;
