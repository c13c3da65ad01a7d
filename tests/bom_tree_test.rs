//! Integration tests for the modular BOM engine against a migrated SQLite
//! database.
//!
//! Tests cover:
//! - Expansion and flattening of the reference scenario
//! - Import with auto-created versions, round trip and idempotence
//! - Rollback on unknown codes and misordered rows
//! - Cycle detection, version activation and export manifests
//! - Store-level uniqueness and import locking across connections

mod common;

use std::{io::Write, sync::Arc};

use assert_matches::assert_matches;
use common::{file_backed_config, seed_scenario, TestDb};
use modular_bom::{
    config::SheetFormat,
    entities::{bom_line, bom_version, material},
    errors::ServiceError,
    services::bom_tree::{BomNode, ImportRow, ManifestSource, SheetRenderer, SheetRow},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

async fn line_count(t: &TestDb) -> u64 {
    bom_line::Entity::find().count(&*t.db).await.unwrap()
}

/// (display path, level, component code, quantity) in pre-order.
fn shape(flat: &[BomNode]) -> Vec<(String, i32, String, Decimal)> {
    flat.iter()
        .map(|n| {
            (
                n.display_position_code.clone(),
                n.level,
                n.component_code.clone(),
                n.quantity,
            )
        })
        .collect()
}

fn row(path: &str, code: &str, qty: Decimal) -> ImportRow {
    ImportRow::new(path, code, qty)
}

#[tokio::test]
async fn scenario_expands_into_nested_tree() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let tree = t.service().expand(s.v1.id).await.unwrap();

    assert_eq!(tree.len(), 1);
    let node = &tree[0];
    assert_eq!(node.display_position_code, "1");
    assert_eq!(node.level, 1);
    assert_eq!(node.component_code, "M2");
    assert_eq!(node.component_unit.as_deref(), Some("pcs"));
    assert_eq!(node.quantity, dec!(2));

    let children = node.children.as_ref().expect("M2 expands");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].display_position_code, "1.A");
    assert_eq!(children[0].level, 2);
    assert_eq!(children[0].component_material_id, s.m3.id);
    assert!(children[0].children.is_none());
}

#[tokio::test]
async fn scenario_flattens_in_pre_order() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let flat = t.service().flatten(s.v1.id).await.unwrap();
    assert_eq!(
        shape(&flat),
        vec![
            ("1".to_string(), 1, "M2".to_string(), dec!(2)),
            ("1.A".to_string(), 2, "M3".to_string(), dec!(5)),
        ]
    );
}

#[tokio::test]
async fn expanding_an_empty_version_returns_nothing() {
    let t = TestDb::new().await;
    let m = t.material("LONE").await;
    let v = t.version(&m, "V1.0", true).await;

    assert!(t.service().expand(v.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn expanding_an_unknown_version_is_not_found() {
    let t = TestDb::new().await;
    assert_matches!(t.service().expand(4242).await, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn import_auto_creates_missing_child_version() {
    let t = TestDb::new().await;
    let n1 = t.material("N1").await;
    t.material("N2").await;
    t.material("N3").await;
    let target = t.version(&n1, "V1.0", true).await;
    let service = t.service();

    let summary = service
        .import(
            target.id,
            vec![row("1", "N2", dec!(2)), row("1.A", "N3", dec!(5))],
        )
        .await
        .unwrap();

    assert_eq!(summary.imported_count, 2);
    assert_eq!(summary.created_versions, vec!["N2_V1.0".to_string()]);

    let created = bom_version::Entity::find()
        .filter(bom_version::Column::VersionCode.eq("N2_V1.0"))
        .one(&*t.db)
        .await
        .unwrap()
        .unwrap();
    assert!(created.is_active);
    assert_eq!(created.remark.as_deref(), Some("auto-created by import"));

    let flat = service.flatten(target.id).await.unwrap();
    assert_eq!(
        shape(&flat),
        vec![
            ("1".to_string(), 1, "N2".to_string(), dec!(2)),
            ("1.A".to_string(), 2, "N3".to_string(), dec!(5)),
        ]
    );
}

#[tokio::test]
async fn auto_created_version_skips_taken_codes() {
    let t = TestDb::new().await;
    let n1 = t.material("N1").await;
    let n2 = t.material("N2").await;
    t.material("N3").await;
    t.version(&n2, "V1.0", false).await;
    let target = t.version(&n1, "V1.0", true).await;

    let summary = t
        .service()
        .import(
            target.id,
            vec![row("1", "N2", dec!(1)), row("1.A", "N3", dec!(1))],
        )
        .await
        .unwrap();

    assert_eq!(summary.created_versions, vec!["N2_V2.0".to_string()]);
}

#[tokio::test]
async fn flattened_tree_round_trips_through_import() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let m4 = t.material("M4").await;
    t.line(&s.v2, "10", &m4, 3).await;
    let service = t.service();

    let exported = service.flatten(s.v1.id).await.unwrap();
    let rows: Vec<ImportRow> = exported.iter().map(ImportRow::from).collect();

    let copy_root = t.material("M1COPY").await;
    let copy = t.version(&copy_root, "V1.0", true).await;
    service.import(copy.id, rows).await.unwrap();

    let copied = service.flatten(copy.id).await.unwrap();
    assert_eq!(shape(&copied), shape(&exported));
}

#[tokio::test]
async fn nested_lines_round_trip_into_the_copy_version() {
    let t = TestDb::new().await;
    let m1 = t.material("M1").await;
    let m2 = t.material("M2").await;
    let m3 = t.material("M3").await;
    let m4 = t.material("M4").await;
    let v1 = t.version(&m1, "V1.0", true).await;
    let v2 = t.version(&m2, "V1.0", true).await;
    let top = t.line(&v1, "1", &m2, 2).await;
    t.nested_line(&top, "X", &m4, 7).await;
    t.line(&v2, "A", &m3, 5).await;
    let service = t.service();

    let exported = service.flatten(v1.id).await.unwrap();
    assert_eq!(
        shape(&exported),
        vec![
            ("1".to_string(), 1, "M2".to_string(), dec!(2)),
            ("1.X".to_string(), 2, "M4".to_string(), dec!(7)),
            ("1.A".to_string(), 2, "M3".to_string(), dec!(5)),
        ]
    );
    let rows: Vec<ImportRow> = exported.iter().map(ImportRow::from).collect();
    assert!(rows[1].nested);

    let copy_root = t.material("M1COPY").await;
    let copy = t.version(&copy_root, "V1.0", true).await;
    let summary = service.import(copy.id, rows).await.unwrap();
    assert!(summary.created_versions.is_empty());

    assert_eq!(shape(&service.flatten(copy.id).await.unwrap()), shape(&exported));
    assert_eq!(shape(&service.flatten(v1.id).await.unwrap()), shape(&exported));

    let copy_lines = bom_line::Entity::find()
        .filter(bom_line::Column::VersionId.eq(copy.id))
        .all(&*t.db)
        .await
        .unwrap();
    assert_eq!(copy_lines.len(), 2);
    let parent = copy_lines
        .iter()
        .find(|l| l.position_code == "1")
        .expect("direct line");
    let nested = copy_lines
        .iter()
        .find(|l| l.position_code == "X")
        .expect("nested line");
    assert_eq!(nested.parent_line_id, Some(parent.id));
    assert_eq!(nested.component_material_id, m4.id);

    // M4 stays a leaf: the nested row never became part of M2's structure
    let m2_lines = bom_line::Entity::find()
        .filter(bom_line::Column::VersionId.eq(v2.id))
        .count(&*t.db)
        .await
        .unwrap();
    assert_eq!(m2_lines, 1);
}

#[tokio::test]
async fn workbook_export_round_trips_through_workbook_import() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let service = t.service();

    let workbook = service.export_xlsx(s.v1.id).await.unwrap();
    assert_eq!(&workbook[..2], b"PK");

    let copy_root = t.material("M1COPY").await;
    let copy = t.version(&copy_root, "V1.0", true).await;
    let summary = service.import_xlsx(copy.id, &workbook).await.unwrap();
    assert_eq!(summary.imported_count, 2);

    assert_eq!(
        shape(&service.flatten(copy.id).await.unwrap()),
        shape(&service.flatten(s.v1.id).await.unwrap())
    );
}

#[tokio::test]
async fn csv_export_round_trips_through_csv_import() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let service = t.service();

    let csv = service.export_csv(s.v1.id).await.unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&csv).unwrap();

    let copy_root = t.material("M1COPY").await;
    let copy = t.version(&copy_root, "V1.0", true).await;
    let reader = std::fs::File::open(file.path()).unwrap();
    let summary = service.import_csv(copy.id, reader).await.unwrap();
    assert_eq!(summary.imported_count, 2);

    assert_eq!(
        shape(&service.flatten(copy.id).await.unwrap()),
        shape(&service.flatten(s.v1.id).await.unwrap())
    );
}

#[tokio::test]
async fn importing_the_same_rows_twice_is_idempotent() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let service = t.service();
    let rows = vec![
        row("1", "M2", dec!(2)),
        row("1.A", "M3", dec!(5)),
        row("2", "M3", dec!(1)),
    ];

    service.import(s.v1.id, rows.clone()).await.unwrap();
    let first = service.flatten(s.v1.id).await.unwrap();
    let lines_after_first = line_count(&t).await;

    let summary = service.import(s.v1.id, rows).await.unwrap();
    assert!(summary.created_versions.is_empty());
    assert_eq!(shape(&service.flatten(s.v1.id).await.unwrap()), shape(&first));
    assert_eq!(line_count(&t).await, lines_after_first);
}

#[tokio::test]
async fn shared_sub_assembly_rows_map_onto_one_line() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let summary = t
        .service()
        .import(
            s.v1.id,
            vec![
                row("1", "M2", dec!(2)),
                row("1.A", "M3", dec!(5)),
                row("2", "M2", dec!(4)),
                row("2.A", "M3", dec!(5)),
            ],
        )
        .await
        .unwrap();

    assert_eq!(summary.imported_count, 3);
    assert_eq!(summary.reused_count, 1);
}

#[tokio::test]
async fn conflicting_slot_is_an_integrity_error() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    t.material("M4").await;

    let result = t
        .service()
        .import(
            s.v1.id,
            vec![
                row("1", "M2", dec!(2)),
                row("1.A", "M3", dec!(5)),
                row("2", "M2", dec!(4)),
                row("2.A", "M4", dec!(5)),
            ],
        )
        .await;
    assert_matches!(result, Err(ServiceError::IntegrityError(msg)) if msg.starts_with("row 4:"));
}

#[tokio::test]
async fn unknown_component_code_leaves_lines_untouched() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let before = line_count(&t).await;

    let result = t
        .service()
        .import(
            s.v1.id,
            vec![row("1", "M2", dec!(2)), row("1.A", "NOPE", dec!(1))],
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::ReferenceError(msg)) if msg.contains("NOPE") && msg.contains("row 2")
    );
    assert_eq!(line_count(&t).await, before);
    assert_eq!(t.service().flatten(s.v1.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn child_before_parent_rolls_back_every_write() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let before = line_count(&t).await;

    let result = t
        .service()
        .import(
            s.v1.id,
            vec![
                row("1", "M2", dec!(2)),
                row("2.A", "M3", dec!(5)),
                row("2", "M2", dec!(1)),
            ],
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::ReferenceError(msg)) if msg.contains("'2'") && msg.contains("row 2")
    );
    assert_eq!(line_count(&t).await, before);
}

#[tokio::test]
async fn soft_deleted_materials_are_not_importable() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let gone = t.material("GONE").await;
    let mut active: material::ActiveModel = gone.into();
    active.deleted_at = Set(Some(chrono::Utc::now()));
    active.update(&*t.db).await.unwrap();

    let result = t
        .service()
        .import(s.v1.id, vec![row("1", "GONE", dec!(1))])
        .await;
    assert_matches!(result, Err(ServiceError::ReferenceError(msg)) if msg.contains("GONE"));
}

#[tokio::test]
async fn non_positive_quantity_is_rejected() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let result = t
        .service()
        .import(s.v1.id, vec![row("1", "M2", dec!(-1))])
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn import_row_limit_comes_from_config() {
    let mut cfg = common::test_config();
    cfg.import_max_rows = 1;
    let t = TestDb::with_config(cfg).await;
    let s = seed_scenario(&t).await;

    let result = t
        .service()
        .import(
            s.v1.id,
            vec![row("1", "M2", dec!(2)), row("1.A", "M3", dec!(5))],
        )
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(msg)) if msg.contains("limit is 1"));
}

#[tokio::test]
async fn padded_path_segments_are_trimmed_before_storing() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let service = t.service();

    service
        .import(
            s.v1.id,
            vec![row(" 1 ", "M2", dec!(2)), row("1. A", "M3", dec!(5))],
        )
        .await
        .unwrap();

    let stored: Vec<String> = bom_line::Entity::find()
        .filter(bom_line::Column::VersionId.is_in([s.v1.id, s.v2.id]))
        .all(&*t.db)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.position_code)
        .collect();
    assert_eq!(stored.len(), 2);
    assert!(stored.contains(&"1".to_string()));
    assert!(stored.contains(&"A".to_string()));
    assert_eq!(
        shape(&service.flatten(s.v1.id).await.unwrap()),
        vec![
            ("1".to_string(), 1, "M2".to_string(), dec!(2)),
            ("1.A".to_string(), 2, "M3".to_string(), dec!(5)),
        ]
    );
}

#[tokio::test]
async fn overlong_position_code_names_the_row() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let before = line_count(&t).await;
    let long = format!("1.{}", "P".repeat(65));

    let result = t
        .service()
        .import(
            s.v1.id,
            vec![row("1", "M2", dec!(2)), row(&long, "M3", dec!(5))],
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::ValidationError(msg)) if msg.starts_with("row 2:") && msg.contains("64")
    );
    assert_eq!(line_count(&t).await, before);
}

#[tokio::test]
async fn import_that_puts_the_target_inside_itself_is_rejected() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let before = line_count(&t).await;

    let result = t
        .service()
        .import(
            s.v1.id,
            vec![row("1", "M2", dec!(2)), row("1.A", "M1", dec!(1))],
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::CycleDetected(msg)) if msg.starts_with("row 2:") && msg.contains("M1")
    );
    assert_eq!(line_count(&t).await, before);
    assert_eq!(
        shape(&t.service().flatten(s.v1.id).await.unwrap()),
        vec![
            ("1".to_string(), 1, "M2".to_string(), dec!(2)),
            ("1.A".to_string(), 2, "M3".to_string(), dec!(5)),
        ]
    );
}

#[tokio::test]
async fn direct_self_reference_is_rejected() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let result = t
        .service()
        .import(s.v1.id, vec![row("1", "M1", dec!(1))])
        .await;
    assert_matches!(result, Err(ServiceError::CycleDetected(msg)) if msg.starts_with("row 1:"));
}

#[tokio::test]
async fn loop_through_an_untouched_version_rolls_back() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let m4 = t.material("M4").await;
    let v4 = t.version(&m4, "V1.0", true).await;
    t.line(&v4, "Z", &s.m1, 1).await;
    let before = line_count(&t).await;

    // M4's structure is not part of the rows, but it already contains M1
    let result = t
        .service()
        .import(s.v1.id, vec![row("1", "M4", dec!(1))])
        .await;

    assert_matches!(
        result,
        Err(ServiceError::CycleDetected(msg)) if msg.contains("closes a loop")
    );
    assert_eq!(line_count(&t).await, before);
}

#[tokio::test]
async fn store_rejects_a_second_active_version() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let second = bom_version::ActiveModel {
        material_id: Set(s.m2.id),
        version_code: Set("M2_V2.0".to_string()),
        is_active: Set(true),
        remark: Set(None),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&*t.db)
    .await;
    assert!(second.is_err());

    // inactive siblings are fine
    t.version(&s.m2, "V3.0", false).await;
}

#[tokio::test]
async fn store_rejects_duplicate_positions_in_one_scope() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let duplicate = bom_line::ActiveModel {
        version_id: Set(s.v1.id),
        parent_line_id: Set(None),
        level: Set(1),
        position_code: Set("1".to_string()),
        component_material_id: Set(s.m3.id),
        quantity: Set(Decimal::ONE),
        process_info: Set(None),
        remark: Set(None),
        ..Default::default()
    }
    .insert(&*t.db)
    .await;
    assert!(duplicate.is_err());

    let top = bom_line::Entity::find()
        .filter(bom_line::Column::VersionId.eq(s.v1.id))
        .one(&*t.db)
        .await
        .unwrap()
        .unwrap();
    // the same code under a parent line is a different scope
    t.nested_line(&top, "1", &s.m3, 1).await;
    let again = bom_line::ActiveModel {
        version_id: Set(s.v1.id),
        parent_line_id: Set(Some(top.id)),
        level: Set(2),
        position_code: Set("1".to_string()),
        component_material_id: Set(s.m2.id),
        quantity: Set(Decimal::ONE),
        process_info: Set(None),
        remark: Set(None),
        ..Default::default()
    }
    .insert(&*t.db)
    .await;
    assert!(again.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_imports_sharing_a_sub_assembly_create_it_once() {
    let dir = tempfile::tempdir().unwrap();
    let t = TestDb::with_config(file_backed_config(&dir.path().join("bom.db"))).await;
    let a = t.material("A").await;
    let b = t.material("B").await;
    let m2 = t.material("M2").await;
    t.material("M3").await;
    let va = t.version(&a, "V1.0", true).await;
    let vb = t.version(&b, "V1.0", true).await;
    let rows = vec![row("1", "M2", dec!(2)), row("1.A", "M3", dec!(5))];

    // one service, as in the server, so both imports share its locks
    let service = t.service();
    let (first, second) = (service.clone(), service.clone());
    let (rows_a, rows_b) = (rows.clone(), rows);
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { first.import(va.id, rows_a).await }),
        tokio::spawn(async move { second.import(vb.id, rows_b).await })
    );
    let (sa, sb) = (ra.unwrap().unwrap(), rb.unwrap().unwrap());

    let mut created = sa.created_versions.clone();
    created.extend(sb.created_versions.clone());
    assert_eq!(created, vec!["M2_V1.0".to_string()]);

    let active: Vec<bom_version::Model> = bom_version::Entity::find()
        .filter(bom_version::Column::MaterialId.eq(m2.id))
        .filter(bom_version::Column::IsActive.eq(true))
        .all(&*t.db)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);

    let m2_lines = bom_line::Entity::find()
        .filter(bom_line::Column::VersionId.eq(active[0].id))
        .count(&*t.db)
        .await
        .unwrap();
    assert_eq!(m2_lines, 1);

    for version in [va.id, vb.id] {
        assert_eq!(
            shape(&service.flatten(version).await.unwrap()),
            vec![
                ("1".to_string(), 1, "M2".to_string(), dec!(2)),
                ("1.A".to_string(), 2, "M3".to_string(), dec!(5)),
            ]
        );
    }
}

#[tokio::test]
async fn cyclic_structure_is_detected() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    t.line(&s.v2, "B", &s.m1, 1).await;

    assert_matches!(
        t.service().expand(s.v1.id).await,
        Err(ServiceError::CycleDetected(msg)) if msg.contains("M1 > M2 > M1")
    );
}

#[tokio::test]
async fn activation_leaves_exactly_one_active_version() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let service = t.service();

    let v2 = service
        .create_version(s.m2.id, None, Some("rework".into()), false)
        .await
        .unwrap();
    assert_eq!(v2.version_code, "M2_V2.0");
    assert!(!v2.is_active);

    service.activate_version(v2.id).await.unwrap();

    let active: Vec<bom_version::Model> = bom_version::Entity::find()
        .filter(bom_version::Column::MaterialId.eq(s.m2.id))
        .filter(bom_version::Column::IsActive.eq(true))
        .all(&*t.db)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, v2.id);

    let resolved = service.resolve_active_version(s.m2.id).await.unwrap();
    assert_eq!(resolved.map(|v| v.id), Some(v2.id));

    // the new version is empty, so M2 is now a leaf under M1
    let tree = service.expand(s.v1.id).await.unwrap();
    assert!(tree[0].children.is_none());
    assert_eq!(tree[0].active_version_code.as_deref(), Some("M2_V2.0"));
}

#[tokio::test]
async fn duplicate_version_code_is_rejected() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;

    let result = t
        .service()
        .create_version(s.m2.id, Some("V1.0".into()), None, true)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn manifest_mirrors_the_tree() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    t.drawing(&s.m1, "m1.pdf").await;
    t.drawing(&s.m2, "m2.dwg").await;
    t.drawing(&s.m3, "m3.pdf").await;

    let entries = t.service().collect_manifest(s.m1.id).await.unwrap();
    let destinations: Vec<&str> = entries.iter().map(|e| e.destination.as_str()).collect();
    assert_eq!(
        destinations,
        vec![
            "M1/M1_V1.0.xlsx",
            "M1/m1.pdf",
            "M1/1_M2_V1.0/m2.dwg",
            "M1/1_M2_V1.0/M2_V1.0.xlsx",
            "M1/1_M2_V1.0/A_M3/m3.pdf",
        ]
    );
    assert_eq!(
        entries[1].source,
        ManifestSource::File("/srv/drawings/M1/m1.pdf".into())
    );
}

#[tokio::test]
async fn csv_sheets_are_selectable_in_config() {
    let mut cfg = common::test_config();
    cfg.sheet_format = SheetFormat::Csv;
    let t = TestDb::with_config(cfg).await;
    let s = seed_scenario(&t).await;

    let entries = t.service().collect_manifest(s.m1.id).await.unwrap();
    assert_eq!(entries[0].destination, "M1/M1_V1.0.csv");
}

#[tokio::test]
async fn manifest_of_unknown_material_is_not_found() {
    let t = TestDb::new().await;
    assert_matches!(
        t.service().collect_manifest(999).await,
        Err(ServiceError::NotFound(_))
    );
}

struct PlainTextRenderer;

impl SheetRenderer for PlainTextRenderer {
    fn extension(&self) -> &str {
        "txt"
    }

    fn render(
        &self,
        version: &bom_version::Model,
        rows: &[SheetRow],
    ) -> Result<Vec<u8>, ServiceError> {
        let mut body = format!("{}\n", version.version_code);
        for row in rows {
            body.push_str(&format!(
                "{} {} x{}\n",
                row.position_code, row.component_code, row.quantity
            ));
        }
        Ok(body.into_bytes())
    }
}

#[tokio::test]
async fn manifest_sheets_come_from_the_configured_renderer() {
    let t = TestDb::new().await;
    let s = seed_scenario(&t).await;
    let service = t.service().with_renderer(Arc::new(PlainTextRenderer));

    let entries = service.collect_manifest(s.m1.id).await.unwrap();
    assert_eq!(entries[0].destination, "M1/M1_V1.0.txt");
    assert_matches!(&entries[0].source, ManifestSource::Buffer(body) => {
        let text = String::from_utf8(body.clone()).unwrap();
        assert!(text.starts_with("M1_V1.0\n1 M2 x"));
    });
}
