//! Modular BOM library
//!
//! Stores bills of materials per material and version, and resolves them into
//! multi-level trees at read time. See [`services::bom_tree`] for the engine.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::services::bom::BomService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub bom_service: BomService,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let bom_service = BomService::from_config(db.clone(), &config);
        Self {
            db,
            config,
            bom_service,
        }
    }
}

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new().nest("/bom", handlers::bom::bom_routes())
}

/// Full application router without middleware layers
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(json!({
        "status": db_status,
        "environment": state.config.environment,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub mod prelude {
    pub use crate::errors::*;
    pub use crate::services::bom::BomService;
    pub use crate::services::bom_tree::{
        BomNode, ImportRow, ImportSummary, ManifestEntry, ManifestSource,
    };
}
