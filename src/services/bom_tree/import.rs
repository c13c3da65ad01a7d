//! Rebuilds the modular graph from a flattened (display path) listing.
//!
//! The caller owns the transaction: every write here goes through `conn`, so
//! running [`import_rows`] on a `DatabaseTransaction` makes the delete, the
//! inserts and any auto-created versions commit or roll back together.

use std::collections::{BTreeSet, HashMap, HashSet};

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::expand::{expand, BomNode};
use super::graph::{BomGraph, LoadOptions, SeaOrmBomRepository};
use super::{path, versions};
use crate::{
    entities::{bom_line, bom_version, material},
    errors::ServiceError,
};

/// One row of a flattened BOM listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    /// Outline level as written in the file. Informational only; the depth
    /// comes from the display path.
    #[serde(default)]
    pub level: Option<i32>,
    pub display_position_code: String,
    pub component_code: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub process_info: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    /// The line sits under its parent row inside the parent row's own
    /// version, instead of in the structure of the parent's component.
    #[serde(default)]
    pub nested: bool,
}

impl ImportRow {
    pub fn new(display_position_code: &str, component_code: &str, quantity: Decimal) -> Self {
        Self {
            level: None,
            display_position_code: display_position_code.to_string(),
            component_code: component_code.to_string(),
            quantity,
            process_info: None,
            remark: None,
            nested: false,
        }
    }

    /// Marks the row as a same-version nested line.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// Rows without a position code or component code carry nothing to
    /// import.
    pub fn is_blank(&self) -> bool {
        self.display_position_code.trim().is_empty() || self.component_code.trim().is_empty()
    }
}

impl From<&BomNode> for ImportRow {
    fn from(node: &BomNode) -> Self {
        Self {
            level: Some(node.level),
            display_position_code: node.display_position_code.clone(),
            component_code: node.component_code.clone(),
            quantity: node.quantity,
            process_info: node.process_info.clone(),
            remark: node.remark.clone(),
            nested: node.parent_line_id.is_some(),
        }
    }
}

/// Drops blank rows, keeping the order of the rest.
pub fn prefilter_rows(rows: Vec<ImportRow>) -> Vec<ImportRow> {
    rows.into_iter().filter(|row| !row.is_blank()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Lines inserted across all touched versions.
    pub imported_count: usize,
    /// Rows that mapped onto a line inserted earlier in the same run.
    pub reused_count: usize,
    /// Codes of versions the import had to create.
    pub created_versions: Vec<String>,
    /// Versions whose lines were replaced, the target included.
    pub replaced_versions: usize,
}

#[derive(Debug, Clone)]
struct ImportedLine {
    line_id: i64,
    version_id: i64,
    material_id: i64,
    /// Materials whose versions hold this line and its ancestors, root first.
    owners: Vec<i64>,
}

#[derive(Debug, Clone)]
struct Slot {
    line_id: i64,
    material_id: i64,
    quantity: Decimal,
}

/// (version id, same-version parent line, position code)
type SlotKey = (i64, Option<i64>, String);

struct ImportRun<'a, C> {
    conn: &'a C,
    target: bom_version::Model,
    materials: HashMap<String, material::Model>,
    /// material id -> code, for error messages
    codes: HashMap<i64, String>,
    /// display path -> line imported earlier in this run
    imported: HashMap<String, ImportedLine>,
    /// material id -> version receiving its child rows
    child_versions: HashMap<i64, i64>,
    slots: HashMap<SlotKey, Slot>,
    replaced: HashSet<i64>,
    summary: ImportSummary,
}

/// Codes of the components whose active version an import of `rows` may
/// clear or create: every row that is the parent of a non-nested row.
pub fn structure_owner_codes(rows: &[ImportRow]) -> BTreeSet<String> {
    let normalized: Vec<(Option<String>, &ImportRow)> = rows
        .iter()
        .map(|row| (path::normalize_display_position_code(&row.display_position_code).ok(), row))
        .collect();
    let by_path: HashMap<&str, &str> = normalized
        .iter()
        .filter_map(|(p, row)| p.as_deref().map(|p| (p, row.component_code.trim())))
        .collect();

    normalized
        .iter()
        .filter(|(_, row)| !row.nested)
        .filter_map(|(p, _)| p.as_deref())
        .filter_map(|p| p.rsplit_once(path::DISPLAY_SEPARATOR).map(|(prefix, _)| prefix))
        .filter_map(|prefix| by_path.get(prefix))
        .map(|code| code.to_string())
        .collect()
}

/// Material ids an import into `target_version_id` writes under: the target's
/// own material and every structure owner of `rows`. Unknown codes are left
/// out; the import itself reports them.
pub async fn import_scope<C>(
    conn: &C,
    target_version_id: i64,
    rows: &[ImportRow],
) -> Result<BTreeSet<i64>, ServiceError>
where
    C: ConnectionTrait,
{
    let target = find_target(conn, target_version_id).await?;
    let mut scope = owner_material_ids(conn, rows, false).await?;
    scope.insert(target.material_id);
    Ok(scope)
}

async fn owner_material_ids<C>(
    conn: &C,
    rows: &[ImportRow],
    lock: bool,
) -> Result<BTreeSet<i64>, ServiceError>
where
    C: ConnectionTrait,
{
    let codes = structure_owner_codes(rows);
    if codes.is_empty() {
        return Ok(BTreeSet::new());
    }

    let mut query = material::Entity::find()
        .filter(material::Column::Code.is_in(codes))
        .order_by_asc(material::Column::Id);
    if lock {
        query = query.lock_exclusive();
    }

    Ok(query
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|m| m.id)
        .collect())
}

async fn find_target<C>(conn: &C, version_id: i64) -> Result<bom_version::Model, ServiceError>
where
    C: ConnectionTrait,
{
    bom_version::Entity::find_by_id(version_id)
        .filter(bom_version::Column::DeletedAt.is_null())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("BOM version {} not found", version_id)))
}

/// Replaces the structure of `target_version_id` with `rows`.
///
/// Rows are processed in order; a parent must precede its children. Any
/// failure leaves the caller's transaction to roll back. Before returning,
/// the rewritten target is expanded once so a run that would leave an
/// unexpandable graph (a cycle through existing versions, say) fails too.
pub async fn import_rows<C>(
    conn: &C,
    target_version_id: i64,
    rows: &[ImportRow],
) -> Result<ImportSummary, ServiceError>
where
    C: ConnectionTrait + Send + Sync,
{
    let target = find_target(conn, target_version_id).await?;

    validate_quantities(rows)?;
    let materials = resolve_component_codes(conn, rows).await?;
    // row locks on Postgres; SQLite already has a single writer
    owner_material_ids(conn, rows, true).await?;

    let mut codes: HashMap<i64, String> =
        materials.values().map(|m| (m.id, m.code.clone())).collect();
    if !codes.contains_key(&target.material_id) {
        if let Some(owner) = material::Entity::find_by_id(target.material_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
        {
            codes.insert(owner.id, owner.code);
        }
    }

    let mut run = ImportRun {
        conn,
        target,
        materials,
        codes,
        imported: HashMap::new(),
        child_versions: HashMap::new(),
        slots: HashMap::new(),
        replaced: HashSet::new(),
        summary: ImportSummary::default(),
    };

    let target_id = run.target.id;
    run.replace_lines(target_id).await?;
    for (idx, row) in rows.iter().enumerate() {
        run.import_row(idx + 1, row).await?;
    }
    run.summary.replaced_versions = run.replaced.len();

    verify_expandable(conn, &run.target).await?;
    Ok(run.summary)
}

async fn verify_expandable<C>(conn: &C, target: &bom_version::Model) -> Result<(), ServiceError>
where
    C: ConnectionTrait + Send + Sync,
{
    let repo = SeaOrmBomRepository::new(conn);
    let (graph, _) = BomGraph::load_from_version(&repo, target.id, LoadOptions::default()).await?;
    expand(&graph, target.id).map_err(|e| match e {
        ServiceError::CycleDetected(msg) => ServiceError::CycleDetected(format!(
            "import into {} closes a loop: {}",
            target.version_code, msg
        )),
        other => other,
    })?;
    Ok(())
}

fn validate_quantities(rows: &[ImportRow]) -> Result<(), ServiceError> {
    for (idx, row) in rows.iter().enumerate() {
        if row.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "row {}: quantity {} of '{}' must be positive",
                idx + 1,
                row.quantity,
                row.display_position_code
            )));
        }
    }
    Ok(())
}

/// Looks up every component code once; the first unknown code fails the run.
async fn resolve_component_codes<C>(
    conn: &C,
    rows: &[ImportRow],
) -> Result<HashMap<String, material::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let codes: HashSet<&str> = rows.iter().map(|r| r.component_code.trim()).collect();
    if codes.is_empty() {
        return Ok(HashMap::new());
    }

    let materials: HashMap<String, material::Model> = material::Entity::find()
        .filter(material::Column::Code.is_in(codes.iter().copied()))
        .filter(material::Column::DeletedAt.is_null())
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|m| (m.code.clone(), m))
        .collect();

    for (idx, row) in rows.iter().enumerate() {
        let code = row.component_code.trim();
        if !materials.contains_key(code) {
            return Err(ServiceError::ReferenceError(format!(
                "row {}: component code '{}' not found",
                idx + 1,
                code
            )));
        }
    }

    Ok(materials)
}

impl<C> ImportRun<'_, C>
where
    C: ConnectionTrait,
{
    /// Deletes the lines of a version the first time this run touches it.
    async fn replace_lines(&mut self, version_id: i64) -> Result<(), ServiceError> {
        if !self.replaced.insert(version_id) {
            return Ok(());
        }

        let deleted = bom_line::Entity::delete_many()
            .filter(bom_line::Column::VersionId.eq(version_id))
            .exec(self.conn)
            .await
            .map_err(ServiceError::db_error)?;
        debug!(
            version_id,
            deleted = deleted.rows_affected,
            "Cleared version lines before import"
        );
        Ok(())
    }

    /// Version that receives the child rows of a component, creating and
    /// activating `<code>_V1.0` (or the next free suffix) when there is none.
    async fn child_version(&mut self, material_id: i64) -> Result<i64, ServiceError> {
        if let Some(version_id) = self.child_versions.get(&material_id) {
            return Ok(*version_id);
        }

        let version_id = match versions::find_active_version(self.conn, material_id).await? {
            Some(version) => version.id,
            None => {
                let version = versions::create_version(
                    self.conn,
                    material_id,
                    None,
                    Some(versions::AUTO_CREATED_REMARK.to_string()),
                    true,
                )
                .await?;
                self.summary.created_versions.push(version.version_code);
                version.id
            }
        };

        self.replace_lines(version_id).await?;
        self.child_versions.insert(material_id, version_id);
        Ok(version_id)
    }

    fn code_of(&self, material_id: i64) -> String {
        self.codes
            .get(&material_id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", material_id))
    }

    async fn import_row(&mut self, row_no: usize, row: &ImportRow) -> Result<(), ServiceError> {
        let with_row = |e: ServiceError| match e {
            ServiceError::IntegrityError(msg) => {
                ServiceError::IntegrityError(format!("row {}: {}", row_no, msg))
            }
            other => other,
        };
        let full_path =
            path::normalize_display_position_code(&row.display_position_code).map_err(with_row)?;
        let (prefix, own) = path::split_display_position_code(&full_path).map_err(with_row)?;
        if own.chars().count() > path::MAX_POSITION_CODE_LEN {
            return Err(ServiceError::ValidationError(format!(
                "row {}: position code '{}' is longer than {} characters",
                row_no,
                own,
                path::MAX_POSITION_CODE_LEN
            )));
        }
        let depth = i32::try_from(full_path.split(path::DISPLAY_SEPARATOR).count())
            .unwrap_or(i32::MAX);

        let component = self
            .materials
            .get(row.component_code.trim())
            .ok_or_else(|| {
                ServiceError::ReferenceError(format!(
                    "row {}: component code '{}' not found",
                    row_no,
                    row.component_code.trim()
                ))
            })?;
        let component_id = component.id;
        let component_code = component.code.clone();

        let (version_id, parent_line_id, owners) = match prefix {
            None if row.nested => {
                return Err(ServiceError::IntegrityError(format!(
                    "row {}: nested line '{}' has no parent row",
                    row_no, full_path
                )));
            }
            None => (self.target.id, None, vec![self.target.material_id]),
            Some(prefix) => {
                let parent = self.imported.get(prefix).cloned().ok_or_else(|| {
                    ServiceError::ReferenceError(format!(
                        "row {}: parent position '{}' of '{}' was not imported before it",
                        row_no, prefix, full_path
                    ))
                })?;
                if row.nested {
                    (parent.version_id, Some(parent.line_id), parent.owners)
                } else {
                    let version_id = self.child_version(parent.material_id).await?;
                    let mut owners = parent.owners;
                    owners.push(parent.material_id);
                    (version_id, None, owners)
                }
            }
        };

        if owners.contains(&component_id) {
            let chain = owners
                .iter()
                .chain(std::iter::once(&component_id))
                .map(|id| self.code_of(*id))
                .collect::<Vec<_>>()
                .join(" > ");
            return Err(ServiceError::CycleDetected(format!(
                "row {}: '{}' puts {} inside its own structure ({})",
                row_no, full_path, component_code, chain
            )));
        }

        let key: SlotKey = (version_id, parent_line_id, own.to_string());
        let line_id = if let Some(slot) = self.slots.get(&key) {
            if slot.material_id != component_id || slot.quantity != row.quantity {
                return Err(ServiceError::IntegrityError(format!(
                    "row {}: position '{}' ({}) conflicts with line {} already imported into the same version",
                    row_no, full_path, component_code, slot.line_id
                )));
            }
            self.summary.reused_count += 1;
            slot.line_id
        } else {
            let line = bom_line::ActiveModel {
                version_id: Set(version_id),
                parent_line_id: Set(parent_line_id),
                level: Set(depth),
                position_code: Set(own.to_string()),
                component_material_id: Set(component_id),
                quantity: Set(row.quantity),
                process_info: Set(row.process_info.clone()),
                remark: Set(row.remark.clone()),
                ..Default::default()
            }
            .insert(self.conn)
            .await
            .map_err(ServiceError::db_error)?;

            self.slots.insert(
                key,
                Slot {
                    line_id: line.id,
                    material_id: component_id,
                    quantity: row.quantity,
                },
            );
            self.summary.imported_count += 1;
            line.id
        };

        self.imported.insert(
            full_path,
            ImportedLine {
                line_id,
                version_id,
                material_id: component_id,
                owners,
            },
        );
        Ok(())
    }
}
