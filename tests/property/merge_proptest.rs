//! Property-based tests for the patch merge engine

use diagramsync::backend::merge::merge;
use diagramsync::shared::{DiagramPatch, DiagramState, Shape, Sheet, SheetPatch};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

fn sheet_of(ids: &[String]) -> Sheet {
    let mut sheet = Sheet::default();
    for id in ids {
        sheet.push_shape(id.clone(), Shape::new(id.clone()));
    }
    sheet
}

fn shape_ids() -> impl Strategy<Value = Vec<String>> {
    btree_set("[a-f]{1,3}", 0..8).prop_map(|set| set.into_iter().collect())
}

fn state_of(sheets: &[(&str, &[String])]) -> DiagramState {
    DiagramState {
        sheets: sheets
            .iter()
            .map(|(id, shapes)| (id.to_string(), sheet_of(shapes)))
            .collect(),
        ..DiagramState::default()
    }
}

proptest! {
    #[test]
    fn test_added_shape_is_appended(existing in shape_ids(), new_id in "[g-k]{1,3}") {
        let current = state_of(&[("s1", existing.as_slice())]);
        let patch = DiagramPatch::sheet("s1", SheetPatch::with_shape(new_id.clone(), Shape::new(new_id.clone())));

        let merged = merge(&current, &patch);
        let sheet = &merged.sheets["s1"];

        let mut expected = existing.clone();
        expected.push(new_id.clone());
        prop_assert_eq!(&sheet.shape_ids, &expected);
        for id in &expected {
            prop_assert!(sheet.shapes_by_id.contains_key(id));
        }
    }

    #[test]
    fn test_untouched_sheets_are_unchanged(
        kept in shape_ids(),
        touched in shape_ids(),
        incoming in shape_ids(),
    ) {
        let current = state_of(&[("kept", kept.as_slice()), ("touched", touched.as_slice())]);
        let patch = DiagramPatch::sheet(
            "touched",
            SheetPatch {
                shapes_by_id: Some(incoming.iter().map(|id| (id.clone(), Shape::new(id.clone()))).collect()),
                ..SheetPatch::default()
            },
        );

        let merged = merge(&current, &patch);
        prop_assert_eq!(&merged.sheets["kept"], &current.sheets["kept"]);
    }

    #[test]
    fn test_merge_never_removes(
        current_ids in shape_ids(),
        patch_ids in shape_ids(),
        order in vec("[a-f]{1,3}", 0..8),
    ) {
        let current = state_of(&[("s1", current_ids.as_slice())]);
        let patch = DiagramPatch::sheet(
            "s1",
            SheetPatch {
                shapes_by_id: Some(patch_ids.iter().map(|id| (id.clone(), Shape::new(id.clone()))).collect::<BTreeMap<_, _>>()),
                shape_ids: Some(order),
                ..SheetPatch::default()
            },
        );

        let merged = merge(&current, &patch);
        let sheet = &merged.sheets["s1"];

        // Current z-order is a prefix of the merged one
        prop_assert_eq!(&sheet.shape_ids[..current_ids.len()], &current_ids[..]);

        let unique: HashSet<&String> = sheet.shape_ids.iter().collect();
        prop_assert_eq!(unique.len(), sheet.shape_ids.len());

        for id in current_ids.iter().chain(patch_ids.iter()) {
            prop_assert!(sheet.shapes_by_id.contains_key(id));
            prop_assert!(unique.contains(id));
        }
    }

    #[test]
    fn test_shape_ids_match_shape_keys(
        current_ids in shape_ids(),
        patch_ids in shape_ids(),
        order in vec("[a-k]{1,3}", 0..8),
    ) {
        let current = state_of(&[("s1", current_ids.as_slice())]);
        let patch = DiagramPatch::sheet(
            "s1",
            SheetPatch {
                shapes_by_id: Some(patch_ids.iter().map(|id| (id.clone(), Shape::new(id.clone()))).collect::<BTreeMap<_, _>>()),
                shape_ids: Some(order),
                ..SheetPatch::default()
            },
        );

        let merged = merge(&current, &patch);
        let sheet = &merged.sheets["s1"];

        let ordered: BTreeSet<&String> = sheet.shape_ids.iter().collect();
        let keys: BTreeSet<&String> = sheet.shapes_by_id.keys().collect();
        prop_assert_eq!(ordered.len(), sheet.shape_ids.len());
        prop_assert_eq!(ordered, keys);
    }

    #[test]
    fn test_empty_patch_is_identity(ids in shape_ids()) {
        let current = state_of(&[("s1", ids.as_slice())]);
        prop_assert_eq!(merge(&current, &DiagramPatch::default()), current);
    }
}
