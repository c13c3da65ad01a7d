//! Property-based tests for the BOM tree engine.
//!
//! Random acyclic modular graphs are expanded and flattened in memory; the
//! invariants below must hold for every generated structure.

use std::cmp::Ordering;

use chrono::Utc;
use modular_bom::{
    entities::{bom_line, bom_version, material, MaterialAttribute},
    services::bom_tree::{cmp_position_codes, expand, flatten, BomGraph, BomNode, MaterialRecord},
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// (position code, child offset, quantity) per line, per material
type Structure = Vec<Vec<(String, usize, u32)>>;

fn position_code_strategy() -> impl Strategy<Value = String> {
    prop_oneof!["[1-9][0-9]{0,2}", "[A-Z][0-9A-Z]{0,3}"]
}

/// Material `i` may only reference materials `j > i`, so every graph is a DAG.
fn structure_strategy() -> impl Strategy<Value = Structure> {
    (2usize..8).prop_flat_map(|count| {
        prop::collection::vec(
            prop::collection::vec((position_code_strategy(), 0usize..64, 1u32..20), 0..4),
            count,
        )
    })
}

fn build_graph(structure: &Structure) -> BomGraph {
    let mut graph = BomGraph::new();
    let count = structure.len();
    let mut line_id = 0i64;

    for (idx, lines) in structure.iter().enumerate() {
        let material_id = idx as i64 + 1;
        graph.insert_material(MaterialRecord {
            material: material::Model {
                id: material_id,
                code: format!("P{}", material_id),
                name: format!("Part {}", material_id),
                spec: None,
                attribute: MaterialAttribute::Manufactured,
                unit_id: None,
                supplier_id: None,
                deleted_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            unit_name: None,
        });

        let children_available = count - idx - 1;
        if children_available == 0 {
            continue;
        }

        let version_id = 1000 + material_id;
        graph.insert_version(bom_version::Model {
            id: version_id,
            material_id,
            version_code: format!("P{}_V1.0", material_id),
            is_active: true,
            remark: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        for (position_code, offset, quantity) in lines {
            line_id += 1;
            let child = idx + 1 + offset % children_available;
            graph.insert_line(bom_line::Model {
                id: line_id,
                version_id,
                parent_line_id: None,
                level: 1,
                position_code: position_code.clone(),
                component_material_id: child as i64 + 1,
                quantity: Decimal::from(*quantity),
                process_info: None,
                remark: None,
                created_at: Utc::now(),
            });
        }
    }

    graph
}

/// Nodes in the expansion of material `idx`.
fn expected_size(structure: &Structure, idx: usize) -> usize {
    let children_available = structure.len() - idx - 1;
    if children_available == 0 {
        return 0;
    }
    structure[idx]
        .iter()
        .map(|(_, offset, _)| 1 + expected_size(structure, idx + 1 + offset % children_available))
        .sum()
}

fn assert_siblings_ordered(nodes: &[BomNode]) -> Result<(), TestCaseError> {
    for pair in nodes.windows(2) {
        prop_assert_ne!(
            cmp_position_codes(&pair[0].position_code, &pair[1].position_code),
            Ordering::Greater
        );
    }
    for node in nodes {
        if let Some(children) = &node.children {
            prop_assert!(!children.is_empty());
            assert_siblings_ordered(children)?;
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn flatten_is_pre_order_with_consistent_paths(structure in structure_strategy()) {
        let graph = build_graph(&structure);
        let flat = flatten(expand(&graph, 1001).unwrap());

        prop_assert_eq!(flat.len(), expected_size(&structure, 0));

        // stack of display paths of the current ancestors
        let mut ancestors: Vec<&str> = Vec::new();
        for node in &flat {
            prop_assert!(node.children.is_none());
            prop_assert!(node.level >= 1);
            prop_assert!(node.level as usize <= ancestors.len() + 1);
            ancestors.truncate(node.level as usize - 1);

            let expected = match ancestors.last() {
                Some(parent) => format!("{}.{}", parent, node.position_code),
                None => node.position_code.clone(),
            };
            prop_assert_eq!(&node.display_position_code, &expected);
            prop_assert_eq!(
                node.level as usize,
                node.display_position_code.split('.').count()
            );
            ancestors.push(&node.display_position_code);
        }
    }

    #[test]
    fn flatten_is_idempotent(structure in structure_strategy()) {
        let graph = build_graph(&structure);
        let once = flatten(expand(&graph, 1001).unwrap());
        let twice = flatten(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn siblings_are_ordered_at_every_level(structure in structure_strategy()) {
        let graph = build_graph(&structure);
        let tree = expand(&graph, 1001).unwrap();
        assert_siblings_ordered(&tree)?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn shorter_position_codes_sort_first(a in "[0-9A-Z]{1,6}", b in "[0-9A-Z]{1,6}") {
        let ordering = cmp_position_codes(&a, &b);
        prop_assert_eq!(ordering, cmp_position_codes(&b, &a).reverse());
        if a.len() < b.len() {
            prop_assert_eq!(ordering, Ordering::Less);
        }
        if ordering == Ordering::Equal {
            prop_assert_eq!(a, b);
        }
    }
}
