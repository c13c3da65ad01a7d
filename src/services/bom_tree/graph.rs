//! In-memory snapshot of the part of the modular BOM graph a traversal needs.
//!
//! The snapshot is built once per top-level request. Loading walks the graph
//! breadth-first and issues one batch of queries per tree depth, never one
//! per node; the traversal then runs synchronously against the maps below.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;

use super::ordering;
use crate::{
    entities::{bom_line, bom_version, drawing, material, unit},
    errors::ServiceError,
};

/// A component material with the identity fields the tree displays.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub material: material::Model,
    pub unit_name: Option<String>,
}

/// Read side of the relational store as seen by the loader.
#[async_trait]
pub trait BomRepository: Send + Sync {
    async fn version(&self, version_id: i64) -> Result<Option<bom_version::Model>, ServiceError>;

    async fn lines_for_versions(
        &self,
        version_ids: &[i64],
    ) -> Result<Vec<bom_line::Model>, ServiceError>;

    /// Active, non-deleted versions for the given materials.
    async fn active_versions_for_materials(
        &self,
        material_ids: &[i64],
    ) -> Result<Vec<bom_version::Model>, ServiceError>;

    async fn materials(&self, material_ids: &[i64]) -> Result<Vec<MaterialRecord>, ServiceError>;

    /// Active, non-deleted drawings for the given materials.
    async fn active_drawings(
        &self,
        material_ids: &[i64],
    ) -> Result<Vec<drawing::Model>, ServiceError>;
}

/// [`BomRepository`] over any sea-orm connection or transaction.
pub struct SeaOrmBomRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C> SeaOrmBomRepository<'a, C>
where
    C: ConnectionTrait,
{
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C> BomRepository for SeaOrmBomRepository<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn version(&self, version_id: i64) -> Result<Option<bom_version::Model>, ServiceError> {
        bom_version::Entity::find_by_id(version_id)
            .filter(bom_version::Column::DeletedAt.is_null())
            .one(self.conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn lines_for_versions(
        &self,
        version_ids: &[i64],
    ) -> Result<Vec<bom_line::Model>, ServiceError> {
        if version_ids.is_empty() {
            return Ok(Vec::new());
        }
        bom_line::Entity::find()
            .filter(bom_line::Column::VersionId.is_in(version_ids.iter().copied()))
            .all(self.conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn active_versions_for_materials(
        &self,
        material_ids: &[i64],
    ) -> Result<Vec<bom_version::Model>, ServiceError> {
        if material_ids.is_empty() {
            return Ok(Vec::new());
        }
        bom_version::Entity::find()
            .filter(bom_version::Column::MaterialId.is_in(material_ids.iter().copied()))
            .filter(bom_version::Column::IsActive.eq(true))
            .filter(bom_version::Column::DeletedAt.is_null())
            .all(self.conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn materials(&self, material_ids: &[i64]) -> Result<Vec<MaterialRecord>, ServiceError> {
        if material_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = material::Entity::find()
            .find_also_related(unit::Entity)
            .filter(material::Column::Id.is_in(material_ids.iter().copied()))
            .all(self.conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows
            .into_iter()
            .map(|(material, unit)| MaterialRecord {
                material,
                unit_name: unit.map(|u| u.name),
            })
            .collect())
    }

    async fn active_drawings(
        &self,
        material_ids: &[i64],
    ) -> Result<Vec<drawing::Model>, ServiceError> {
        if material_ids.is_empty() {
            return Ok(Vec::new());
        }
        drawing::Entity::find()
            .filter(drawing::Column::MaterialId.is_in(material_ids.iter().copied()))
            .filter(drawing::Column::IsActive.eq(true))
            .filter(drawing::Column::DeletedAt.is_null())
            .all(self.conn)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// What the loader fetches besides lines, materials and active versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub with_drawings: bool,
}

/// Immutable snapshot of versions, lines, materials and drawings.
#[derive(Debug, Default, Clone)]
pub struct BomGraph {
    materials: HashMap<i64, MaterialRecord>,
    versions: HashMap<i64, bom_version::Model>,
    /// material id -> active version id
    active_versions: HashMap<i64, i64>,
    /// version id -> lines, sibling-ordered
    lines: HashMap<i64, Vec<bom_line::Model>>,
    /// material id -> active drawings
    drawings: HashMap<i64, Vec<drawing::Model>>,
}

impl BomGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_material(&mut self, record: MaterialRecord) {
        self.materials.insert(record.material.id, record);
    }

    /// Registers a version. Usable (active, non-deleted) versions also enter
    /// the material -> active version index.
    pub fn insert_version(&mut self, version: bom_version::Model) {
        if version.is_usable() {
            self.active_versions.insert(version.material_id, version.id);
        }
        self.versions.insert(version.id, version);
    }

    pub fn insert_line(&mut self, line: bom_line::Model) {
        self.insert_lines(std::iter::once(line));
    }

    /// Adds a batch of lines, sorting each touched version once.
    pub fn insert_lines<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = bom_line::Model>,
    {
        let mut touched = HashSet::new();
        for line in lines {
            touched.insert(line.version_id);
            self.lines.entry(line.version_id).or_default().push(line);
        }
        for version_id in touched {
            if let Some(lines) = self.lines.get_mut(&version_id) {
                ordering::sort_lines(lines);
            }
        }
    }

    pub fn insert_drawing(&mut self, drawing: drawing::Model) {
        if drawing.is_active && drawing.deleted_at.is_none() {
            self.drawings
                .entry(drawing.material_id)
                .or_default()
                .push(drawing);
        }
    }

    pub fn material(&self, material_id: i64) -> Option<&MaterialRecord> {
        self.materials.get(&material_id)
    }

    pub fn version(&self, version_id: i64) -> Option<&bom_version::Model> {
        self.versions.get(&version_id)
    }

    /// O(1) active version lookup against the prefetched index.
    pub fn resolve_active_version(&self, material_id: i64) -> Option<&bom_version::Model> {
        self.active_versions
            .get(&material_id)
            .and_then(|id| self.versions.get(id))
    }

    /// Every line of a version, sibling-ordered.
    pub fn lines(&self, version_id: i64) -> &[bom_line::Model] {
        self.lines
            .get(&version_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Lines at the top of a version (no same-version parent).
    pub fn direct_lines(&self, version_id: i64) -> Vec<&bom_line::Model> {
        self.lines(version_id)
            .iter()
            .filter(|line| line.parent_line_id.is_none())
            .collect()
    }

    /// Lines nested under `parent_line_id` inside the same version.
    pub fn nested_lines(&self, version_id: i64, parent_line_id: i64) -> Vec<&bom_line::Model> {
        self.lines(version_id)
            .iter()
            .filter(|line| line.parent_line_id == Some(parent_line_id))
            .collect()
    }

    pub fn has_lines(&self, version_id: i64) -> bool {
        !self.lines(version_id).is_empty()
    }

    pub fn drawings(&self, material_id: i64) -> &[drawing::Model] {
        self.drawings
            .get(&material_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Checks that every nested line of a version can be reached from a
    /// direct line: each parent exists in the same version and parent chains
    /// do not loop.
    pub fn check_version_integrity(&self, version_id: i64) -> Result<(), ServiceError> {
        let lines = self.lines(version_id);
        let by_id: HashMap<i64, &bom_line::Model> = lines.iter().map(|l| (l.id, l)).collect();
        let version_code = self
            .version(version_id)
            .map(|v| v.version_code.as_str())
            .unwrap_or("?");

        for line in lines {
            let mut current = line;
            let mut steps = 0usize;
            while let Some(parent_id) = current.parent_line_id {
                current = by_id.get(&parent_id).copied().ok_or_else(|| {
                    ServiceError::IntegrityError(format!(
                        "line {} (position '{}') of version {} has parent line {} which is not part of the version",
                        line.id, line.position_code, version_code, parent_id
                    ))
                })?;
                steps += 1;
                if steps > lines.len() {
                    return Err(ServiceError::IntegrityError(format!(
                        "line {} (position '{}') of version {} has a looping parent chain",
                        line.id, line.position_code, version_code
                    )));
                }
            }
        }

        Ok(())
    }

    /// Loads the graph reachable from one version.
    pub async fn load_from_version<R>(
        repo: &R,
        version_id: i64,
        options: LoadOptions,
    ) -> Result<(Self, bom_version::Model), ServiceError>
    where
        R: BomRepository + ?Sized,
    {
        let root = repo
            .version(version_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM version {} not found", version_id)))?;

        let mut graph = Self::new();
        let mut loader = Loader::new(options);
        graph.insert_version(root.clone());
        loader.seen_versions.insert(root.id);

        let mut frontier = vec![root.id];
        frontier.extend(
            loader
                .load_materials(repo, &mut graph, vec![root.material_id])
                .await?,
        );
        loader.expand(repo, &mut graph, frontier).await?;

        Ok((graph, root))
    }

    /// Loads the graph reachable from a material's active version. The
    /// material itself (and its drawings, when requested) is always loaded,
    /// even when it has no active version.
    pub async fn load_from_material<R>(
        repo: &R,
        material_id: i64,
        options: LoadOptions,
    ) -> Result<(Self, Option<bom_version::Model>), ServiceError>
    where
        R: BomRepository + ?Sized,
    {
        let mut graph = Self::new();
        let mut loader = Loader::new(options);

        let versions = loader
            .load_materials(repo, &mut graph, vec![material_id])
            .await?;
        if graph.material(material_id).is_none() {
            return Err(ServiceError::NotFound(format!(
                "Material {} not found",
                material_id
            )));
        }

        loader.expand(repo, &mut graph, versions).await?;
        let root = graph.resolve_active_version(material_id).cloned();

        Ok((graph, root))
    }
}

struct Loader {
    options: LoadOptions,
    seen_versions: HashSet<i64>,
    seen_materials: HashSet<i64>,
}

impl Loader {
    fn new(options: LoadOptions) -> Self {
        Self {
            options,
            seen_versions: HashSet::new(),
            seen_materials: HashSet::new(),
        }
    }

    /// Fetches materials not seen yet together with their active versions
    /// (and drawings). Returns the ids of newly discovered active versions.
    async fn load_materials<R>(
        &mut self,
        repo: &R,
        graph: &mut BomGraph,
        material_ids: Vec<i64>,
    ) -> Result<Vec<i64>, ServiceError>
    where
        R: BomRepository + ?Sized,
    {
        let fresh: Vec<i64> = material_ids
            .into_iter()
            .filter(|id| self.seen_materials.insert(*id))
            .collect();
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        for record in repo.materials(&fresh).await? {
            graph.insert_material(record);
        }

        let mut next = Vec::new();
        for version in repo.active_versions_for_materials(&fresh).await? {
            if self.seen_versions.insert(version.id) {
                next.push(version.id);
            }
            graph.insert_version(version);
        }

        if self.options.with_drawings {
            for drawing in repo.active_drawings(&fresh).await? {
                graph.insert_drawing(drawing);
            }
        }

        Ok(next)
    }

    async fn expand<R>(
        &mut self,
        repo: &R,
        graph: &mut BomGraph,
        mut frontier: Vec<i64>,
    ) -> Result<(), ServiceError>
    where
        R: BomRepository + ?Sized,
    {
        let mut depth = 0usize;
        while !frontier.is_empty() {
            depth += 1;
            debug!(depth, versions = frontier.len(), "Loading BOM graph level");

            let lines = repo.lines_for_versions(&frontier).await?;
            let components: Vec<i64> = lines.iter().map(|l| l.component_material_id).collect();
            graph.insert_lines(lines);

            frontier = self.load_materials(repo, graph, components).await?;
        }
        Ok(())
    }
}
