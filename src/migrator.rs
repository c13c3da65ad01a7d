use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_bom_tables::Migration),
            Box::new(m20240301_000003_create_drawings_table::Migration),
            Box::new(m20240415_000004_add_bom_uniqueness_indexes::Migration),
        ]
    }
}

#[derive(DeriveIden)]
enum Units {
    Table,
    Id,
    Name,
    Symbol,
}

#[derive(DeriveIden)]
enum Suppliers {
    Table,
    Id,
    Code,
    Name,
    Contact,
}

#[derive(DeriveIden)]
enum Materials {
    Table,
    Id,
    Code,
    Name,
    Spec,
    Attribute,
    UnitId,
    SupplierId,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BomVersions {
    Table,
    Id,
    MaterialId,
    VersionCode,
    IsActive,
    Remark,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BomLines {
    Table,
    Id,
    VersionId,
    ParentLineId,
    Level,
    PositionCode,
    ComponentMaterialId,
    Quantity,
    ProcessInfo,
    Remark,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Drawings {
    Table,
    Id,
    MaterialId,
    BatchLabel,
    FileName,
    FilePath,
    IsActive,
    DeletedAt,
    CreatedAt,
}

mod m20240301_000001_create_catalog_tables {
    use super::{Materials, Suppliers, Units};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Units::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Units::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Units::Name)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Units::Symbol).string_len(16).null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Suppliers::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Suppliers::Name).string_len(255).not_null())
                        .col(ColumnDef::new(Suppliers::Contact).string_len(255).null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Materials::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Materials::Code)
                                .string_len(100)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Materials::Name).string_len(255).not_null())
                        .col(ColumnDef::new(Materials::Spec).string_len(255).null())
                        .col(
                            ColumnDef::new(Materials::Attribute)
                                .string_len(16)
                                .not_null()
                                .default("purchased"),
                        )
                        .col(ColumnDef::new(Materials::UnitId).big_integer().null())
                        .col(ColumnDef::new(Materials::SupplierId).big_integer().null())
                        .col(
                            ColumnDef::new(Materials::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Materials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Materials::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_materials_unit_id")
                                .from(Materials::Table, Materials::UnitId)
                                .to(Units::Table, Units::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_materials_supplier_id")
                                .from(Materials::Table, Materials::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Units::Table).to_owned())
                .await
        }
    }
}

mod m20240301_000002_create_bom_tables {
    use super::{BomLines, BomVersions, Materials};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_bom_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BomVersions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomVersions::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::MaterialId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::VersionCode)
                                .string_len(128)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::IsActive)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(BomVersions::Remark).string_len(512).null())
                        .col(
                            ColumnDef::new(BomVersions::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomVersions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_versions_material_id")
                                .from(BomVersions::Table, BomVersions::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_versions_material_active")
                        .table(BomVersions::Table)
                        .col(BomVersions::MaterialId)
                        .col(BomVersions::IsActive)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BomLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(BomLines::VersionId).big_integer().not_null())
                        .col(ColumnDef::new(BomLines::ParentLineId).big_integer().null())
                        .col(
                            ColumnDef::new(BomLines::Level)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(BomLines::PositionCode)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomLines::ComponentMaterialId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomLines::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomLines::ProcessInfo).string_len(512).null())
                        .col(ColumnDef::new(BomLines::Remark).string_len(512).null())
                        .col(
                            ColumnDef::new(BomLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_lines_version_id")
                                .from(BomLines::Table, BomLines::VersionId)
                                .to(BomVersions::Table, BomVersions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_lines_component_material_id")
                                .from(BomLines::Table, BomLines::ComponentMaterialId)
                                .to(Materials::Table, Materials::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_lines_version_id")
                        .table(BomLines::Table)
                        .col(BomLines::VersionId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BomVersions::Table).to_owned())
                .await
        }
    }
}

mod m20240301_000003_create_drawings_table {
    use super::{Drawings, Materials};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_drawings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Drawings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Drawings::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Drawings::MaterialId).big_integer().not_null())
                        .col(ColumnDef::new(Drawings::BatchLabel).string_len(64).not_null())
                        .col(ColumnDef::new(Drawings::FileName).string_len(255).not_null())
                        .col(ColumnDef::new(Drawings::FilePath).string_len(1024).not_null())
                        .col(
                            ColumnDef::new(Drawings::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Drawings::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Drawings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_drawings_material_id")
                                .from(Drawings::Table, Drawings::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_drawings_material_id")
                        .table(Drawings::Table)
                        .col(Drawings::MaterialId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Drawings::Table).to_owned())
                .await
        }
    }
}

/// Partial unique indexes; plain `CREATE UNIQUE INDEX ... WHERE` is accepted
/// by both SQLite and Postgres.
mod m20240415_000004_add_bom_uniqueness_indexes {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240415_000004_add_bom_uniqueness_indexes"
        }
    }

    const UP: [&str; 3] = [
        // one active, non-deleted version per material
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_bom_versions_active_material \
         ON bom_versions (material_id) WHERE is_active AND deleted_at IS NULL",
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_bom_lines_direct_position \
         ON bom_lines (version_id, position_code) WHERE parent_line_id IS NULL",
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_bom_lines_nested_position \
         ON bom_lines (version_id, parent_line_id, position_code) WHERE parent_line_id IS NOT NULL",
    ];

    const DOWN: [&str; 3] = [
        "DROP INDEX IF EXISTS uq_bom_lines_nested_position",
        "DROP INDEX IF EXISTS uq_bom_lines_direct_position",
        "DROP INDEX IF EXISTS uq_bom_versions_active_material",
    ];

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            for sql in UP {
                db.execute_unprepared(sql).await?;
            }
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            for sql in DOWN {
                db.execute_unprepared(sql).await?;
            }
            Ok(())
        }
    }
}
