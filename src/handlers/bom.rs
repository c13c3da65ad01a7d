use super::common::{
    created_response, csv_response, map_service_error, success_response, validate_input,
    xlsx_response,
};
use crate::{errors::ApiError, handlers::AppState, services::bom_tree::ImportRow};
use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Creates the router for modular BOM endpoints
pub fn bom_routes() -> Router<AppState> {
    Router::new()
        .route("/versions/:id/tree", get(get_tree))
        .route("/versions/:id/flat", get(get_flat))
        .route("/versions/:id/export.csv", get(export_csv))
        .route("/versions/:id/export.xlsx", get(export_xlsx))
        .route("/versions/:id/import", post(import_rows))
        .route("/versions/:id/import.xlsx", post(import_xlsx))
        .route("/versions/:id/activate", post(activate_version))
        .route("/materials/:id/versions", post(create_version))
        .route("/materials/:id/active-version", get(get_active_version))
        .route("/materials/:id/manifest", get(get_manifest))
}

// Request and response DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct ImportRequest {
    #[validate(length(min = 1))]
    pub rows: Vec<ImportRow>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVersionRequest {
    #[validate(length(min = 1, max = 32))]
    pub suffix: Option<String>,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Serialize)]
pub struct ManifestResponse {
    pub material_id: i64,
    pub file_count: usize,
    pub generated_count: usize,
    pub entries: Vec<crate::services::bom_tree::ManifestEntry>,
}

// Handler functions

/// Fully expanded tree of a version
async fn get_tree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tree = state
        .bom_service
        .expand(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(tree))
}

/// Pre-order flattened tree of a version
async fn get_flat(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let flat = state
        .bom_service
        .flatten(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(flat))
}

async fn export_csv(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .bom_service
        .export_csv(id)
        .await
        .map_err(map_service_error)?;
    Ok(csv_response(&format!("bom_version_{}.csv", id), body))
}

async fn export_xlsx(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .bom_service
        .export_xlsx(id)
        .await
        .map_err(map_service_error)?;
    Ok(xlsx_response(&format!("bom_version_{}.xlsx", id), body))
}

/// Replace a version's structure with the rows of an uploaded workbook
async fn import_xlsx(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .bom_service
        .import_xlsx(id, &body)
        .await
        .map_err(map_service_error)?;

    info!(
        "BOM workbook import via API: version_id={}, lines={}",
        id, summary.imported_count
    );
    Ok(success_response(summary))
}

/// Replace a version's structure with flattened rows
async fn import_rows(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let summary = state
        .bom_service
        .import(id, payload.rows)
        .await
        .map_err(map_service_error)?;

    info!(
        "BOM import via API: version_id={}, lines={}",
        id, summary.imported_count
    );
    Ok(success_response(summary))
}

async fn activate_version(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let version = state
        .bom_service
        .activate_version(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(version))
}

async fn create_version(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
    Json(payload): Json<CreateVersionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let version = state
        .bom_service
        .create_version(
            material_id,
            payload.suffix,
            payload.remark,
            payload.activate,
        )
        .await
        .map_err(map_service_error)?;
    Ok(created_response(version))
}

async fn get_active_version(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let version = state
        .bom_service
        .resolve_active_version(material_id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Material {} has no active BOM version",
                material_id
            ))
        })?;
    Ok(success_response(version))
}

async fn get_manifest(
    State(state): State<AppState>,
    Path(material_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    use crate::services::bom_tree::ManifestSource;

    let entries = state
        .bom_service
        .collect_manifest(material_id)
        .await
        .map_err(map_service_error)?;

    let file_count = entries
        .iter()
        .filter(|e| matches!(e.source, ManifestSource::File(_)))
        .count();
    Ok(success_response(ManifestResponse {
        material_id,
        file_count,
        generated_count: entries.len() - file_count,
        entries,
    }))
}
