//! The single recursive walk over a [`BomGraph`].
//!
//! Tree display, manifest collection and anything else that needs the
//! materialized structure plug in through [`BomVisitor`]. The walk owns
//! ordering, path/level bookkeeping, reference checks and cycle detection so
//! visitors only decide what to produce per node.

use super::graph::{BomGraph, MaterialRecord};
use super::path;
use crate::{
    entities::{bom_line, bom_version},
    errors::ServiceError,
};

/// Everything the walk knows about one expanded line.
#[derive(Debug, Clone)]
pub struct NodeContext<'g> {
    pub line: &'g bom_line::Model,
    pub component: &'g MaterialRecord,
    /// Relative depth, 1 for the root version's direct lines.
    pub level: i32,
    pub display_position_code: String,
    /// The component's active version, if any.
    pub active_version: Option<&'g bom_version::Model>,
}

impl NodeContext<'_> {
    /// Whether the component's active version has lines to descend into.
    pub fn expands(&self, graph: &BomGraph) -> bool {
        self.active_version
            .map(|v| graph.has_lines(v.id))
            .unwrap_or(false)
    }
}

pub trait BomVisitor {
    /// State handed from a node to its children (a folder path, a depth...).
    type Scope;
    type Output;

    /// Called in pre-order, before any child of `node` is visited.
    fn enter(
        &mut self,
        parent: &Self::Scope,
        node: &NodeContext<'_>,
    ) -> Result<Self::Scope, ServiceError>;

    /// Called in post-order with the outputs of the node's children.
    fn exit(
        &mut self,
        scope: Self::Scope,
        node: NodeContext<'_>,
        children: Vec<Self::Output>,
    ) -> Self::Output;
}

/// Walks the direct lines of `root_version_id` and everything below them.
///
/// Returns one output per direct line of the root version, in sibling order.
/// An unknown root version or one without lines yields an empty result.
pub fn walk<V>(
    graph: &BomGraph,
    root_version_id: i64,
    root_scope: &V::Scope,
    visitor: &mut V,
) -> Result<Vec<V::Output>, ServiceError>
where
    V: BomVisitor,
{
    let Some(root) = graph.version(root_version_id) else {
        return Ok(Vec::new());
    };

    let mut walker = Walker {
        graph,
        visitor,
        path: vec![PathEntry::of(graph, root)],
    };
    walker.version(root.id, None, 1, root_scope)
}

struct PathEntry {
    version_id: i64,
    material_code: String,
}

impl PathEntry {
    fn of(graph: &BomGraph, version: &bom_version::Model) -> Self {
        let material_code = graph
            .material(version.material_id)
            .map(|m| m.material.code.clone())
            .unwrap_or_else(|| format!("#{}", version.material_id));
        Self {
            version_id: version.id,
            material_code,
        }
    }
}

struct Walker<'g, 'v, V> {
    graph: &'g BomGraph,
    visitor: &'v mut V,
    /// Versions on the current expansion path, root first.
    path: Vec<PathEntry>,
}

impl<'g, V> Walker<'g, '_, V>
where
    V: BomVisitor,
{
    fn version(
        &mut self,
        version_id: i64,
        prefix: Option<&str>,
        level: i32,
        scope: &V::Scope,
    ) -> Result<Vec<V::Output>, ServiceError> {
        self.graph.check_version_integrity(version_id)?;

        let graph = self.graph;
        graph
            .direct_lines(version_id)
            .into_iter()
            .map(|line| self.line(line, prefix, level, scope))
            .collect()
    }

    fn line(
        &mut self,
        line: &'g bom_line::Model,
        prefix: Option<&str>,
        level: i32,
        parent_scope: &V::Scope,
    ) -> Result<V::Output, ServiceError> {
        let graph = self.graph;
        let component = graph.material(line.component_material_id).ok_or_else(|| {
            ServiceError::ReferenceError(format!(
                "line {} (position '{}') references material {} which does not exist",
                line.id, line.position_code, line.component_material_id
            ))
        })?;

        let node = NodeContext {
            line,
            component,
            level,
            display_position_code: path::display_position_code(prefix, &line.position_code),
            active_version: graph.resolve_active_version(component.material.id),
        };

        let scope = self.visitor.enter(parent_scope, &node)?;
        let mut children = Vec::new();

        for nested in graph.nested_lines(line.version_id, line.id) {
            children.push(self.line(
                nested,
                Some(&node.display_position_code),
                level + 1,
                &scope,
            )?);
        }

        if let Some(active) = node.active_version.filter(|v| graph.has_lines(v.id)) {
            self.guard_cycle(active, &component.material.code)?;
            self.path.push(PathEntry {
                version_id: active.id,
                material_code: component.material.code.clone(),
            });
            let result = self.version(
                active.id,
                Some(&node.display_position_code),
                level + 1,
                &scope,
            );
            self.path.pop();
            children.extend(result?);
        }

        Ok(self.visitor.exit(scope, node, children))
    }

    fn guard_cycle(
        &self,
        version: &bom_version::Model,
        material_code: &str,
    ) -> Result<(), ServiceError> {
        if !self.path.iter().any(|e| e.version_id == version.id) {
            return Ok(());
        }

        let chain = self
            .path
            .iter()
            .map(|e| e.material_code.as_str())
            .chain(std::iter::once(material_code))
            .collect::<Vec<_>>()
            .join(" > ");
        Err(ServiceError::CycleDetected(format!(
            "version {} is reached again through {}",
            version.version_code, chain
        )))
    }
}
