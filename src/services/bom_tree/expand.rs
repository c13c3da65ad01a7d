use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::graph::BomGraph;
use super::traversal::{walk, BomVisitor, NodeContext};
use crate::{entities::MaterialAttribute, errors::ServiceError};

/// One line of a materialized multi-level BOM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomNode {
    pub line_id: i64,
    pub version_id: i64,
    pub parent_line_id: Option<i64>,
    /// Depth relative to the expanded root, starting at 1.
    pub level: i32,
    pub position_code: String,
    /// Ancestor position codes joined with `.`, e.g. `1.A.3`.
    pub display_position_code: String,
    pub component_material_id: i64,
    pub component_code: String,
    pub component_name: String,
    pub component_spec: Option<String>,
    pub component_unit: Option<String>,
    pub component_attribute: MaterialAttribute,
    pub quantity: Decimal,
    pub process_info: Option<String>,
    pub remark: Option<String>,
    /// Code of the component's active version, when it has one.
    pub active_version_code: Option<String>,
    /// Absent for leaves; never an empty list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BomNode>>,
}

impl BomNode {
    pub fn is_leaf(&self) -> bool {
        self.children.as_ref().map_or(true, Vec::is_empty)
    }

    /// Number of nodes in this subtree, the node itself included.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(BomNode::subtree_size)
            .sum::<usize>()
    }
}

/// Builds owned [`BomNode`]s bottom-up.
#[derive(Debug, Default)]
pub struct ExpandVisitor;

impl BomVisitor for ExpandVisitor {
    type Scope = ();
    type Output = BomNode;

    fn enter(&mut self, _parent: &(), _node: &NodeContext<'_>) -> Result<(), ServiceError> {
        Ok(())
    }

    fn exit(&mut self, _scope: (), node: NodeContext<'_>, children: Vec<BomNode>) -> BomNode {
        let line = node.line;
        let material = &node.component.material;
        BomNode {
            line_id: line.id,
            version_id: line.version_id,
            parent_line_id: line.parent_line_id,
            level: node.level,
            position_code: line.position_code.clone(),
            display_position_code: node.display_position_code,
            component_material_id: material.id,
            component_code: material.code.clone(),
            component_name: material.name.clone(),
            component_spec: material.spec.clone(),
            component_unit: node.component.unit_name.clone(),
            component_attribute: material.attribute,
            quantity: line.quantity,
            process_info: line.process_info.clone(),
            remark: line.remark.clone(),
            active_version_code: node.active_version.map(|v| v.version_code.clone()),
            children: (!children.is_empty()).then_some(children),
        }
    }
}

/// Expands a version of the snapshot into its full tree.
pub fn expand(graph: &BomGraph, root_version_id: i64) -> Result<Vec<BomNode>, ServiceError> {
    walk(graph, root_version_id, &(), &mut ExpandVisitor)
}
