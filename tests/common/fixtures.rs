//! Diagram state builders

use diagramsync::shared::{DiagramPatch, DiagramState, Shape, Sheet, SheetPatch};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// `{sheets: {<sheet>: {shapesById: {...}, shapeIds: [...]}}}`
pub fn state_with(sheet_id: &str, shapes: &[&str]) -> DiagramState {
    let mut sheet = Sheet::default();
    for id in shapes {
        sheet.push_shape(*id, Shape::new(*id));
    }
    DiagramState {
        sheets: BTreeMap::from([(sheet_id.to_string(), sheet)]),
        ..DiagramState::default()
    }
}

/// Patch adding one shape on top of a sheet
pub fn add_shape(sheet_id: &str, shape_id: &str) -> DiagramPatch {
    DiagramPatch::sheet(sheet_id, SheetPatch::with_shape(shape_id, Shape::new(shape_id)))
}

/// Shape ids of a sheet in z-order
pub fn shape_order(state: &DiagramState, sheet_id: &str) -> Vec<String> {
    state
        .sheets
        .get(sheet_id)
        .map(|sheet| sheet.shape_ids.clone())
        .unwrap_or_default()
}

pub fn json_state(state: &DiagramState) -> Value {
    serde_json::to_value(state).expect("state serializes")
}

pub fn create_body(state: &DiagramState) -> Value {
    json!({ "state": json_state(state) })
}
