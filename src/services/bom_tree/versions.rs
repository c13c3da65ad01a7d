//! Version management: creation, activation and single active-version
//! lookups against the database.
//!
//! Every function takes a generic connection so callers decide the
//! transaction boundary. Activation touches several rows and must run inside
//! one.

use std::collections::HashSet;

use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    Set,
};
use tracing::{debug, info};

use super::path;
use crate::{
    entities::{bom_version, material},
    errors::ServiceError,
};

/// Remark stored on versions the importer creates on its own.
pub const AUTO_CREATED_REMARK: &str = "auto-created by import";

/// The active, non-deleted version of a material.
pub async fn find_active_version<C>(
    conn: &C,
    material_id: i64,
) -> Result<Option<bom_version::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    bom_version::Entity::find()
        .filter(bom_version::Column::MaterialId.eq(material_id))
        .filter(bom_version::Column::IsActive.eq(true))
        .filter(bom_version::Column::DeletedAt.is_null())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub async fn find_material<C>(conn: &C, material_id: i64) -> Result<material::Model, ServiceError>
where
    C: ConnectionTrait,
{
    material::Entity::find_by_id(material_id)
        .filter(material::Column::DeletedAt.is_null())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", material_id)))
}

/// First `V<n>.0` suffix not used by any version code of the material.
pub async fn next_version_suffix<C>(conn: &C, material: &material::Model) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    let taken: HashSet<String> = bom_version::Entity::find()
        .filter(bom_version::Column::MaterialId.eq(material.id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|v| v.version_code)
        .collect();

    let mut major = 1u32;
    loop {
        let suffix = format!("V{}.0", major);
        if !taken.contains(&path::version_code(&material.code, &suffix)) {
            return Ok(suffix);
        }
        major += 1;
    }
}

async fn deactivate_siblings<C>(
    conn: &C,
    material_id: i64,
    keep_version_id: Option<i64>,
) -> Result<u64, ServiceError>
where
    C: ConnectionTrait,
{
    let mut update = bom_version::Entity::update_many()
        .col_expr(bom_version::Column::IsActive, Expr::value(false))
        .col_expr(bom_version::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(bom_version::Column::MaterialId.eq(material_id))
        .filter(bom_version::Column::IsActive.eq(true));
    if let Some(keep) = keep_version_id {
        update = update.filter(bom_version::Column::Id.ne(keep));
    }

    let result = update.exec(conn).await.map_err(ServiceError::db_error)?;
    Ok(result.rows_affected)
}

/// Creates `<material_code>_V<suffix>`. Without a suffix the next free
/// `V<n>.0` is used. An activated version deactivates its siblings.
pub async fn create_version<C>(
    conn: &C,
    material_id: i64,
    suffix: Option<&str>,
    remark: Option<String>,
    activate: bool,
) -> Result<bom_version::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let material = find_material(conn, material_id).await?;
    let suffix = match suffix.map(str::trim).filter(|s| !s.is_empty()) {
        Some(suffix) => suffix.to_string(),
        None => next_version_suffix(conn, &material).await?,
    };
    let version_code = path::version_code(&material.code, &suffix);

    let duplicate = bom_version::Entity::find()
        .filter(bom_version::Column::MaterialId.eq(material.id))
        .filter(bom_version::Column::VersionCode.eq(version_code.as_str()))
        .filter(bom_version::Column::DeletedAt.is_null())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if duplicate.is_some() {
        return Err(ServiceError::InvalidOperation(format!(
            "version {} already exists",
            version_code
        )));
    }

    if activate {
        deactivate_siblings(conn, material.id, None).await?;
    }

    let version = bom_version::ActiveModel {
        material_id: Set(material.id),
        version_code: Set(version_code),
        is_active: Set(activate),
        remark: Set(remark),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    info!(
        material = %material.code,
        version = %version.version_code,
        active = version.is_active,
        "BOM version created"
    );
    Ok(version)
}

/// Makes `version_id` the only active version of its material.
pub async fn activate_version<C>(
    conn: &C,
    version_id: i64,
) -> Result<bom_version::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let version = bom_version::Entity::find_by_id(version_id)
        .filter(bom_version::Column::DeletedAt.is_null())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("BOM version {} not found", version_id)))?;

    let deactivated = deactivate_siblings(conn, version.material_id, Some(version.id)).await?;
    debug!(version_id, deactivated, "Deactivated sibling versions");

    if version.is_active {
        return Ok(version);
    }

    let mut active: bom_version::ActiveModel = version.into();
    active.is_active = Set(true);
    let version = active.update(conn).await.map_err(ServiceError::db_error)?;

    info!(version = %version.version_code, "BOM version activated");
    Ok(version)
}
