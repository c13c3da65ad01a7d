//! Export manifest: the files an archive of a material's structure would
//! contain, laid out in folders that mirror the expanded tree.
//!
//! Nothing is written to disk here. Packaging consumes the entries.

use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use super::graph::BomGraph;
use super::path;
use super::tabular::{SheetRenderer, SheetRow};
use super::traversal::{walk, BomVisitor, NodeContext};
use crate::{
    entities::{bom_version, drawing},
    errors::ServiceError,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestSource {
    /// A drawing file on disk.
    File(PathBuf),
    /// A generated sheet; serialized as its size in bytes.
    Buffer(#[serde(serialize_with = "serialize_buffer_len")] Vec<u8>),
}

fn serialize_buffer_len<S>(buffer: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(buffer.len() as u64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub source: ManifestSource,
    /// Archive-relative path, `/`-separated.
    pub destination: String,
}

struct ManifestBuilder<'a> {
    graph: &'a BomGraph,
    renderer: &'a dyn SheetRenderer,
    drawing_root: &'a Path,
    entries: Vec<ManifestEntry>,
}

impl ManifestBuilder<'_> {
    fn push_drawings(&mut self, folder: &str, drawings: &[drawing::Model]) {
        for drawing in drawings {
            self.entries.push(ManifestEntry {
                source: ManifestSource::File(self.drawing_root.join(&drawing.file_path)),
                destination: path::join_folder(folder, &drawing.file_name),
            });
        }
    }

    fn push_sheet(&mut self, folder: &str, version: &bom_version::Model) -> Result<(), ServiceError> {
        let rows = SheetRow::for_version(self.graph, version.id)?;
        let body = self.renderer.render(version, &rows)?;
        let file_name = format!("{}.{}", version.version_code, self.renderer.extension());
        self.entries.push(ManifestEntry {
            source: ManifestSource::Buffer(body),
            destination: path::join_folder(folder, &file_name),
        });
        Ok(())
    }
}

impl BomVisitor for ManifestBuilder<'_> {
    type Scope = String;
    type Output = ();

    fn enter(&mut self, parent: &String, node: &NodeContext<'_>) -> Result<String, ServiceError> {
        let segment = path::folder_segment(
            &node.line.position_code,
            &node.component.material.code,
            node.active_version.and_then(|v| v.suffix()),
        );
        let folder = path::join_folder(parent, &segment);

        let graph = self.graph;
        self.push_drawings(&folder, graph.drawings(node.component.material.id));
        if let Some(version) = node.active_version.filter(|_| node.expands(graph)) {
            self.push_sheet(&folder, version)?;
        }

        Ok(folder)
    }

    fn exit(&mut self, _scope: String, _node: NodeContext<'_>, _children: Vec<()>) {}
}

/// Collects the manifest of a material from a snapshot loaded with drawings.
///
/// The root folder is the material code. A material without an active
/// version contributes its drawings only.
pub fn collect_manifest(
    graph: &BomGraph,
    root_material_id: i64,
    renderer: &dyn SheetRenderer,
    drawing_root: &Path,
) -> Result<Vec<ManifestEntry>, ServiceError> {
    let root = graph.material(root_material_id).ok_or_else(|| {
        ServiceError::NotFound(format!("Material {} not found", root_material_id))
    })?;
    let root_folder = root.material.code.clone();

    let mut builder = ManifestBuilder {
        graph,
        renderer,
        drawing_root,
        entries: Vec::new(),
    };

    let active = graph.resolve_active_version(root_material_id);
    if let Some(version) = active.filter(|v| graph.has_lines(v.id)) {
        builder.push_sheet(&root_folder, version)?;
    }
    builder.push_drawings(&root_folder, graph.drawings(root_material_id));

    if let Some(version) = active {
        walk(graph, version.id, &root_folder, &mut builder)?;
    }

    Ok(builder.entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bom_tree::graph::fixtures::*;
    use crate::services::bom_tree::tabular::CsvSheetRenderer;

    fn destinations(entries: &[ManifestEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.destination.as_str()).collect()
    }

    #[test]
    fn scenario_manifest_mirrors_the_tree() {
        let mut graph = scenario();
        graph.insert_drawing(drawing(1, 1, "m1.pdf"));
        graph.insert_drawing(drawing(2, 2, "m2.dwg"));
        graph.insert_drawing(drawing(3, 3, "m3.pdf"));

        let entries =
            collect_manifest(&graph, 1, &CsvSheetRenderer, Path::new("/srv/drawings")).unwrap();

        assert_eq!(
            destinations(&entries),
            vec![
                "M1/M1_V1.0.csv",
                "M1/m1.pdf",
                "M1/1_M2_V1.0/m2.dwg",
                "M1/1_M2_V1.0/M2_V1.0.csv",
                "M1/1_M2_V1.0/A_M3/m3.pdf",
            ]
        );
        assert_eq!(
            entries[1].source,
            ManifestSource::File(PathBuf::from("/srv/drawings/1/m1.pdf"))
        );
        assert!(matches!(entries[0].source, ManifestSource::Buffer(ref b) if !b.is_empty()));
    }

    #[test]
    fn material_without_version_lists_only_drawings() {
        let mut graph = scenario();
        graph.insert_drawing(drawing(3, 3, "m3.pdf"));

        let entries = collect_manifest(&graph, 3, &CsvSheetRenderer, Path::new("d")).unwrap();
        assert_eq!(destinations(&entries), vec!["M3/m3.pdf"]);
    }

    #[test]
    fn inactive_drawings_are_not_collected() {
        let mut graph = scenario();
        let mut old = drawing(4, 3, "old.pdf");
        old.is_active = false;
        graph.insert_drawing(old);

        let entries = collect_manifest(&graph, 3, &CsvSheetRenderer, Path::new("d")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn buffers_serialize_as_their_length() {
        let entry = ManifestEntry {
            source: ManifestSource::Buffer(vec![1, 2, 3]),
            destination: "M1/M1_V1.0.csv".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["source"]["buffer"], 3);
    }
}
