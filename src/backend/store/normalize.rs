//! Storage normalization
//!
//! Catalog shapes (those with a non-empty `path`) can be re-rendered from the shape
//! catalog, so their inline `svgContent` is dropped before persisting.
//! Custom shapes without a `path` keep their inline SVG.

use crate::shared::diagram::{DiagramState, Shape};

/// Copy of `state` as it is written to storage
pub fn for_storage(state: &DiagramState) -> DiagramState {
    let mut stored = state.clone();
    for sheet in stored.sheets.values_mut() {
        for shape in sheet.shapes_by_id.values_mut() {
            strip_svg_content(shape);
        }
    }
    stored
}

fn strip_svg_content(shape: &mut Shape) {
    if shape.path.as_deref().is_some_and(|path| !path.is_empty()) {
        shape.svg_content = None;
    }
}
