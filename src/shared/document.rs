//! Document Records
//!
//! Versioned diagram documents, share grants and history entries as they
//! travel over the API.

use crate::shared::diagram::DiagramState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One versioned diagram with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    pub id: Uuid,
    /// `None` for unowned (legacy) documents
    pub owner_id: Option<Uuid>,
    /// Starts at 1, incremented by exactly 1 on every write
    pub version: i64,
    pub state: DiagramState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Diagram {
    pub fn summary(&self) -> DiagramSummary {
        DiagramSummary {
            id: self.id,
            owner_id: self.owner_id,
            version: self.version,
            diagram_name: self.state.diagram_name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing view of a diagram (no state)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramSummary {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub version: i64,
    pub diagram_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing view of a diagram shared with the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDiagramSummary {
    #[serde(flatten)]
    pub diagram: DiagramSummary,
    pub permission: Permission,
    pub can_copy: bool,
}

/// Permission carried by a share grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Edit => "edit",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Permission::View),
            "edit" => Ok(Permission::Edit),
            other => Err(format!("unknown permission '{other}'")),
        }
    }
}

/// Grant allowing a non-owner to read or write a diagram
///
/// Keyed by `(diagram_id, grantee_id)`; granting again updates in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareGrant {
    pub diagram_id: Uuid,
    pub grantee_id: Uuid,
    pub permission: Permission,
    pub can_copy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operation that produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOperation {
    Create,
    Replace,
    Patch,
    Restore,
}

impl HistoryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryOperation::Create => "create",
            HistoryOperation::Replace => "replace",
            HistoryOperation::Patch => "patch",
            HistoryOperation::Restore => "restore",
        }
    }
}

impl FromStr for HistoryOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(HistoryOperation::Create),
            "replace" => Ok(HistoryOperation::Replace),
            "patch" => Ok(HistoryOperation::Patch),
            "restore" => Ok(HistoryOperation::Restore),
            other => Err(format!("unknown history operation '{other}'")),
        }
    }
}

/// Immutable snapshot appended after every commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub diagram_id: Uuid,
    /// Version the document reached with this commit
    pub version: i64,
    pub operation: HistoryOperation,
    pub actor_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Omitted from list views unless explicitly requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DiagramState>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn without_state(mut self) -> Self {
        self.state = None;
        self
    }
}
