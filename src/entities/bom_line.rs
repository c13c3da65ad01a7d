use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};

/// A single slot in a BOM version. The line points at a component material,
/// never at a child version; the child structure is resolved at read time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub version_id: i64,
    pub parent_line_id: Option<i64>,
    pub level: i32,
    pub position_code: String,
    pub component_material_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,
    pub process_info: Option<String>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bom_version::Entity",
        from = "Column::VersionId",
        to = "super::bom_version::Column::Id"
    )]
    BomVersion,
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::ComponentMaterialId",
        to = "super::material::Column::Id"
    )]
    ComponentMaterial,
}

impl Related<super::bom_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomVersion.def()
    }
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ComponentMaterial.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = ActiveValue::Set(Utc::now());
            }
        }

        Ok(self)
    }
}
