/**
 * Diagram HTTP Handlers
 *
 * Thin axum adapters over [`DiagramService`]. Identifiers arrive as raw
 * strings; malformed ones are reported as not found by the service.
 *
 * # Routes
 *
 * - `POST /diagrams` - create (201)
 * - `GET /diagrams` - diagrams owned by the caller
 * - `GET /diagrams/shared` - diagrams shared with the caller
 * - `GET|PUT|PATCH|DELETE /diagrams/{id}`
 * - `GET|POST /diagrams/{id}/shares`, `DELETE /diagrams/{id}/shares/{granteeId}`
 * - `GET /diagrams/{id}/history`, `GET /diagrams/{id}/history/{entryId}`
 * - `POST /diagrams/{id}/history/{entryId}/restore`
 */

use crate::backend::diagrams::service::DiagramService;
use crate::backend::diagrams::types::{
    ApplyPatchRequest, CreateDiagramRequest, GrantRequest, HistoryParams, ReplaceDiagramRequest,
};
use crate::backend::error::BackendError;
use crate::backend::middleware::MaybeIdentity;
use crate::shared::{Diagram, DiagramSummary, HistoryEntry, ShareGrant, SharedDiagramSummary};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

type ApiResult<T> = Result<T, BackendError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| BackendError::validation("body", rejection.body_text()))
}

pub async fn create_diagram(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    payload: Result<Json<CreateDiagramRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Diagram>)> {
    let request = body(payload)?;
    let diagram = service
        .create(identity.identity(), request.state, request.owner_id)
        .await?;
    Ok((StatusCode::CREATED, Json(diagram)))
}

pub async fn list_my_diagrams(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
) -> ApiResult<Json<Vec<DiagramSummary>>> {
    Ok(Json(service.list_mine(identity.identity()).await?))
}

pub async fn list_shared_diagrams(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
) -> ApiResult<Json<Vec<SharedDiagramSummary>>> {
    Ok(Json(service.list_shared_with_me(identity.identity()).await?))
}

pub async fn get_diagram(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<Diagram>> {
    Ok(Json(service.read(identity.identity(), &id).await?))
}

pub async fn replace_diagram(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path(id): Path<String>,
    payload: Result<Json<ReplaceDiagramRequest>, JsonRejection>,
) -> ApiResult<Json<Diagram>> {
    let request = body(payload)?;
    let diagram = service
        .replace(identity.identity(), &id, request.state, request.expected_version)
        .await?;
    Ok(Json(diagram))
}

pub async fn patch_diagram(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path(id): Path<String>,
    payload: Result<Json<ApplyPatchRequest>, JsonRejection>,
) -> ApiResult<Json<Diagram>> {
    let request = body(payload)?;
    let diagram = service
        .apply(identity.identity(), &id, request.state, request.expected_version)
        .await?;
    Ok(Json(diagram))
}

pub async fn delete_diagram(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<Diagram>> {
    Ok(Json(service.remove(identity.identity(), &id).await?))
}

pub async fn list_shares(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ShareGrant>>> {
    Ok(Json(service.list_grants(identity.identity(), &id).await?))
}

pub async fn grant_shares(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path(id): Path<String>,
    payload: Result<Json<GrantRequest>, JsonRejection>,
) -> ApiResult<Json<Vec<ShareGrant>>> {
    let request = body(payload)?;
    let grants = service
        .grant(
            identity.identity(),
            &id,
            request.grantee_ids,
            request.permission,
            request.can_copy,
        )
        .await?;
    Ok(Json(grants))
}

pub async fn revoke_share(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path((id, grantee_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    service.revoke(identity.identity(), &id, &grantee_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_history(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let entries = service
        .list_history(identity.identity(), &id, params.into())
        .await?;
    Ok(Json(entries))
}

pub async fn get_history_entry(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path((id, entry_id)): Path<(String, String)>,
) -> ApiResult<Json<HistoryEntry>> {
    Ok(Json(
        service
            .get_history_entry(identity.identity(), &id, &entry_id)
            .await?,
    ))
}

pub async fn restore_history_entry(
    State(service): State<DiagramService>,
    identity: MaybeIdentity,
    Path((id, entry_id)): Path<(String, String)>,
) -> ApiResult<Json<Diagram>> {
    Ok(Json(
        service.restore(identity.identity(), &id, &entry_id).await?,
    ))
}
