#![allow(dead_code)]

use std::{path::Path, sync::Arc};

use chrono::Utc;
use modular_bom::{
    config::AppConfig,
    db,
    entities::{bom_line, bom_version, drawing, material, unit, MaterialAttribute},
    services::bom::BomService,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Application config pointing at a private in-memory SQLite database.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
    // one connection keeps the in-memory database alive and shared
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.drawing_root = "/srv/drawings".to_string();
    cfg
}

/// Application config over a SQLite file with two pooled connections, so
/// concurrent callers really run on separate connections.
pub fn file_backed_config(path: &Path) -> AppConfig {
    let mut cfg = test_config();
    cfg.database_url = format!("sqlite://{}?mode=rwc", path.display());
    cfg.db_max_connections = 2;
    cfg.db_min_connections = 1;
    cfg
}

/// Harness over a freshly migrated database.
pub struct TestDb {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pcs: i64,
}

impl TestDb {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to migrate test database");

        let pcs = unit::ActiveModel {
            name: Set("pcs".to_string()),
            symbol: Set(Some("pc".to_string())),
            ..Default::default()
        }
        .insert(&pool)
        .await
        .expect("failed to seed unit");

        Self {
            db: Arc::new(pool),
            config,
            pcs: pcs.id,
        }
    }

    pub fn service(&self) -> BomService {
        BomService::from_config(self.db.clone(), &self.config)
    }

    pub async fn material(&self, code: &str) -> material::Model {
        material::ActiveModel {
            code: Set(code.to_string()),
            name: Set(format!("{} assembly", code)),
            spec: Set(None),
            attribute: Set(MaterialAttribute::Manufactured),
            unit_id: Set(Some(self.pcs)),
            supplier_id: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed material")
    }

    pub async fn version(&self, material: &material::Model, suffix: &str, active: bool) -> bom_version::Model {
        bom_version::ActiveModel {
            material_id: Set(material.id),
            version_code: Set(format!("{}_{}", material.code, suffix)),
            is_active: Set(active),
            remark: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed version")
    }

    pub async fn line(
        &self,
        version: &bom_version::Model,
        position_code: &str,
        component: &material::Model,
        quantity: i64,
    ) -> bom_line::Model {
        bom_line::ActiveModel {
            version_id: Set(version.id),
            parent_line_id: Set(None),
            level: Set(1),
            position_code: Set(position_code.to_string()),
            component_material_id: Set(component.id),
            quantity: Set(Decimal::from(quantity)),
            process_info: Set(None),
            remark: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed line")
    }

    /// A line nested under `parent` inside the parent's own version.
    pub async fn nested_line(
        &self,
        parent: &bom_line::Model,
        position_code: &str,
        component: &material::Model,
        quantity: i64,
    ) -> bom_line::Model {
        bom_line::ActiveModel {
            version_id: Set(parent.version_id),
            parent_line_id: Set(Some(parent.id)),
            level: Set(parent.level + 1),
            position_code: Set(position_code.to_string()),
            component_material_id: Set(component.id),
            quantity: Set(Decimal::from(quantity)),
            process_info: Set(None),
            remark: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed nested line")
    }

    pub async fn drawing(&self, material: &material::Model, file_name: &str) -> drawing::Model {
        drawing::ActiveModel {
            material_id: Set(material.id),
            batch_label: Set("B1".to_string()),
            file_name: Set(file_name.to_string()),
            file_path: Set(format!("{}/{}", material.code, file_name)),
            is_active: Set(true),
            deleted_at: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed drawing")
    }
}

/// M1_V1.0 "1" -> M2 x2; M2_V1.0 "A" -> M3 x5; M3 has no version.
pub struct Scenario {
    pub m1: material::Model,
    pub m2: material::Model,
    pub m3: material::Model,
    pub v1: bom_version::Model,
    pub v2: bom_version::Model,
}

pub async fn seed_scenario(t: &TestDb) -> Scenario {
    let m1 = t.material("M1").await;
    let m2 = t.material("M2").await;
    let m3 = t.material("M3").await;
    let v1 = t.version(&m1, "V1.0", true).await;
    let v2 = t.version(&m2, "V1.0", true).await;
    t.line(&v1, "1", &m2, 2).await;
    t.line(&v2, "A", &m3, 5).await;
    Scenario { m1, m2, m3, v1, v2 }
}
