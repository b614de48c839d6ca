//! Diagram State Tree
//!
//! Typed representation of a multi-sheet diagram document and of the partial
//! patches clients send against it.
//!
//! # Structure
//!
//! ```text
//! DiagramState
//! └── sheets: sheetId → Sheet
//!     ├── shapesById: shapeId → Shape
//!     ├── shapeIds: [shapeId]          (z-order)
//!     └── connectors: connectorId → Connector
//! ```
//!
//! Every level keeps the fields the server reasons about as typed fields and
//! carries all remaining client fields in a flattened `extra` map, so editor
//! specific properties (colours, fonts, zoom, layers...) round-trip untouched.
//!
//! # Patches
//!
//! `DiagramPatch` and `SheetPatch` mirror the state types with every field
//! optional. An absent field means "not part of this patch", never "delete".

use crate::shared::error::SharedError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// A single shape on a sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub shape_type: Option<String>,
    /// Catalog path of the shape's SVG asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Inline SVG markup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg_content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Shape {
    /// Create a bare shape with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// A connector between two shapes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_node_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Connector {
    pub fn between(id: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            start_node_id: Some(start.into()),
            end_node_id: Some(end.into()),
            extra: Map::new(),
        }
    }
}

/// One sheet (tab) of a diagram
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub shapes_by_id: BTreeMap<String, Shape>,
    /// Z-order of the shapes; a permutation of the keys of `shapes_by_id`
    #[serde(default)]
    pub shape_ids: Vec<String>,
    #[serde(default)]
    pub connectors: BTreeMap<String, Connector>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sheet {
    /// Add a shape on top of the z-order
    pub fn push_shape(&mut self, shape_id: impl Into<String>, shape: Shape) {
        let shape_id = shape_id.into();
        if !self.shape_ids.contains(&shape_id) {
            self.shape_ids.push(shape_id.clone());
        }
        self.shapes_by_id.insert(shape_id, shape);
    }
}

/// Complete state of a diagram document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramState {
    #[serde(default)]
    pub sheets: BTreeMap<String, Sheet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_sheet_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DiagramState {
    /// Validate the structural rules the store relies on
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the offending field when:
    /// - `diagramName` is present but blank
    /// - a sheet's `shapeIds` contains a duplicate
    /// - a shape or connector carries an `id` different from its key
    pub fn validate(&self) -> Result<(), SharedError> {
        if let Some(name) = &self.diagram_name {
            if name.trim().is_empty() {
                return Err(SharedError::validation("diagramName", "Diagram name cannot be blank"));
            }
        }

        for (sheet_id, sheet) in &self.sheets {
            validate_sheet_parts(
                sheet_id,
                &sheet.shapes_by_id,
                &sheet.shape_ids,
                &sheet.connectors,
            )?;
        }

        Ok(())
    }

    /// Every shape id present anywhere in the document
    pub fn shape_ids(&self) -> HashSet<&str> {
        self.sheets
            .values()
            .flat_map(|sheet| sheet.shapes_by_id.keys().map(String::as_str))
            .collect()
    }

    /// Connectors whose endpoints reference shapes that do not exist
    ///
    /// Dangling connectors are tolerated in stored state; this is a
    /// diagnostic used by logging and tests.
    pub fn dangling_connectors(&self) -> Vec<(String, String)> {
        let shapes = self.shape_ids();
        let mut dangling = Vec::new();
        for (sheet_id, sheet) in &self.sheets {
            for (connector_id, connector) in &sheet.connectors {
                let endpoints = [&connector.start_node_id, &connector.end_node_id];
                let missing = endpoints
                    .iter()
                    .filter_map(|endpoint| endpoint.as_deref())
                    .any(|endpoint| !shapes.contains(endpoint));
                if missing {
                    dangling.push((sheet_id.clone(), connector_id.clone()));
                }
            }
        }
        dangling
    }
}

/// Partial sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shapes_by_id: Option<BTreeMap<String, Shape>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectors: Option<BTreeMap<String, Connector>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SheetPatch {
    /// Patch that adds (or replaces) a single shape and appends it to the z-order
    pub fn with_shape(shape_id: impl Into<String>, shape: Shape) -> Self {
        let shape_id = shape_id.into();
        Self {
            shapes_by_id: Some(BTreeMap::from([(shape_id.clone(), shape)])),
            shape_ids: Some(vec![shape_id]),
            ..Self::default()
        }
    }
}

/// Partial diagram
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheets: Option<BTreeMap<String, SheetPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_sheet_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DiagramPatch {
    /// Patch touching a single sheet
    pub fn sheet(sheet_id: impl Into<String>, patch: SheetPatch) -> Self {
        Self {
            sheets: Some(BTreeMap::from([(sheet_id.into(), patch)])),
            ..Self::default()
        }
    }

    /// Validate the parts of the patch that are present
    pub fn validate(&self) -> Result<(), SharedError> {
        if let Some(name) = &self.diagram_name {
            if name.trim().is_empty() {
                return Err(SharedError::validation("diagramName", "Diagram name cannot be blank"));
            }
        }

        let empty_shapes = BTreeMap::new();
        let empty_connectors = BTreeMap::new();
        for (sheet_id, sheet) in self.sheets.iter().flatten() {
            validate_sheet_parts(
                sheet_id,
                sheet.shapes_by_id.as_ref().unwrap_or(&empty_shapes),
                sheet.shape_ids.as_deref().unwrap_or_default(),
                sheet.connectors.as_ref().unwrap_or(&empty_connectors),
            )?;
        }

        Ok(())
    }
}

fn validate_sheet_parts(
    sheet_id: &str,
    shapes_by_id: &BTreeMap<String, Shape>,
    shape_ids: &[String],
    connectors: &BTreeMap<String, Connector>,
) -> Result<(), SharedError> {
    let mut seen = HashSet::with_capacity(shape_ids.len());
    for shape_id in shape_ids {
        if !seen.insert(shape_id.as_str()) {
            return Err(SharedError::validation(
                format!("sheets.{sheet_id}.shapeIds"),
                format!("Duplicate shape id '{shape_id}'"),
            ));
        }
    }

    for (key, shape) in shapes_by_id {
        if shape.id.as_deref().is_some_and(|id| id != key) {
            return Err(SharedError::validation(
                format!("sheets.{sheet_id}.shapesById.{key}"),
                "Shape id does not match its key",
            ));
        }
    }

    for (key, connector) in connectors {
        if connector.id.as_deref().is_some_and(|id| id != key) {
            return Err(SharedError::validation(
                format!("sheets.{sheet_id}.connectors.{key}"),
                "Connector id does not match its key",
            ));
        }
    }

    Ok(())
}
