/**
 * API Route Handlers
 *
 * Registers the diagram endpoints.
 *
 * # Routes
 *
 * ## Diagrams
 * - `POST /diagrams` - create
 * - `GET /diagrams` - list owned
 * - `GET /diagrams/shared` - list shared with the caller
 * - `GET /diagrams/{id}` - read
 * - `PUT /diagrams/{id}` - replace
 * - `PATCH /diagrams/{id}` - apply a patch
 * - `DELETE /diagrams/{id}` - remove
 *
 * ## Shares
 * - `GET /diagrams/{id}/shares` - list grants
 * - `POST /diagrams/{id}/shares` - grant
 * - `DELETE /diagrams/{id}/shares/{granteeId}` - revoke
 *
 * ## History
 * - `GET /diagrams/{id}/history` - list entries
 * - `GET /diagrams/{id}/history/{entryId}` - one entry with its state
 * - `POST /diagrams/{id}/history/{entryId}/restore` - restore an entry
 */

use crate::backend::diagrams::handlers::{
    create_diagram, delete_diagram, get_diagram, get_history_entry, grant_shares, list_history,
    list_my_diagrams, list_shared_diagrams, list_shares, patch_diagram, replace_diagram,
    restore_history_entry, revoke_share,
};
use crate::backend::server::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Configure API routes
///
/// Every route accepts an optional `Authorization: Bearer` header or
/// `authToken` cookie; the service decides what an anonymous caller may do.
pub fn configure_api_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/diagrams", post(create_diagram).get(list_my_diagrams))
        .route("/diagrams/shared", get(list_shared_diagrams))
        .route(
            "/diagrams/{id}",
            get(get_diagram)
                .put(replace_diagram)
                .patch(patch_diagram)
                .delete(delete_diagram),
        )
        .route("/diagrams/{id}/shares", get(list_shares).post(grant_shares))
        .route(
            "/diagrams/{id}/shares/{grantee_id}",
            axum::routing::delete(revoke_share),
        )
        .route("/diagrams/{id}/history", get(list_history))
        .route("/diagrams/{id}/history/{entry_id}", get(get_history_entry))
        .route(
            "/diagrams/{id}/history/{entry_id}/restore",
            post(restore_history_entry),
        )
}
