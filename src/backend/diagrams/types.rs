//! Request and response bodies of the diagram API

use crate::backend::store::HistoryQuery;
use crate::shared::{DiagramPatch, DiagramState, Permission};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /diagrams`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiagramRequest {
    pub state: Option<DiagramState>,
    /// Honoured for admins only
    pub owner_id: Option<Uuid>,
}

/// `PUT /diagrams/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceDiagramRequest {
    pub state: Option<DiagramState>,
    /// Present for a guarded write; absent means force-overwrite
    pub expected_version: Option<i64>,
}

/// `PATCH /diagrams/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPatchRequest {
    pub state: Option<DiagramPatch>,
    pub expected_version: Option<i64>,
}

/// `POST /diagrams/{id}/shares`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub grantee_ids: Vec<Uuid>,
    pub permission: Permission,
    #[serde(default)]
    pub can_copy: bool,
}

/// `GET /diagrams/{id}/history` query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_state: bool,
}

impl From<HistoryParams> for HistoryQuery {
    fn from(params: HistoryParams) -> Self {
        HistoryQuery::new(params.limit, params.offset, params.include_state)
    }
}
