//! Patch Merge Engine
//!
//! `merge(current, patch)` computes the next diagram state from a stored
//! snapshot and a partial patch. It is a pure function: inputs are borrowed
//! immutably and a new state is returned, so the read-merge-write boundary
//! stays inside the store's transaction.
//!
//! # Rules
//!
//! - Top-level fields: patch wins per key; `sheets` is merged per sheet.
//! - Sheets only in `current` pass through unchanged; sheets only in the
//!   patch are inserted.
//! - Within a sheet: scalar fields are overridden by the patch,
//!   `shapesById` and `connectors` are merged by key union with patch
//!   precedence, and `shapeIds` is an order-preserving union (current order
//!   first, then ids new in the patch, in patch order). A patch id with no
//!   shape in the merged `shapesById` is dropped.
//! - Any key of the merged `shapesById` still missing from `shapeIds` is
//!   appended to the z-order, in key order.
//!
//! Nothing is ever removed: omission means "not part of this patch".

use crate::shared::diagram::{DiagramPatch, DiagramState, Sheet, SheetPatch};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Merge a patch into a diagram state
pub fn merge(current: &DiagramState, patch: &DiagramPatch) -> DiagramState {
    let mut merged = current.clone();

    if let Some(name) = &patch.diagram_name {
        merged.diagram_name = Some(name.clone());
    }
    if let Some(active) = &patch.active_sheet_id {
        merged.active_sheet_id = Some(active.clone());
    }
    override_fields(&mut merged.extra, &patch.extra);

    for (sheet_id, sheet_patch) in patch.sheets.iter().flatten() {
        let next = match current.sheets.get(sheet_id) {
            Some(existing) => merge_sheet(existing, sheet_patch),
            None => merge_sheet(&Sheet::default(), sheet_patch),
        };
        merged.sheets.insert(sheet_id.clone(), next);
    }

    merged
}

fn merge_sheet(current: &Sheet, patch: &SheetPatch) -> Sheet {
    let mut merged = current.clone();

    if let Some(name) = &patch.name {
        merged.name = Some(name.clone());
    }
    override_fields(&mut merged.extra, &patch.extra);

    if let Some(shapes) = &patch.shapes_by_id {
        union_by_key(&mut merged.shapes_by_id, shapes);
    }
    if let Some(connectors) = &patch.connectors {
        union_by_key(&mut merged.connectors, connectors);
    }

    let mut seen: HashSet<String> = merged.shape_ids.iter().cloned().collect();
    for shape_id in patch.shape_ids.iter().flatten() {
        if !merged.shapes_by_id.contains_key(shape_id) {
            continue;
        }
        if seen.insert(shape_id.clone()) {
            merged.shape_ids.push(shape_id.clone());
        }
    }
    for shape_id in merged.shapes_by_id.keys() {
        if seen.insert(shape_id.clone()) {
            merged.shape_ids.push(shape_id.clone());
        }
    }

    merged
}

fn union_by_key<V: Clone>(target: &mut BTreeMap<String, V>, incoming: &BTreeMap<String, V>) {
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
}

fn override_fields(target: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
}
