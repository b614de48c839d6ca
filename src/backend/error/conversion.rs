/**
 * Error Conversion
 *
 * `IntoResponse` for backend errors so handlers can return them directly.
 *
 * # Response Format
 *
 * ```json
 * {"error": "forbidden", "message": "Only the owner can manage shares", "status": 403}
 * ```
 *
 * Conflicts use the structured conflict body instead:
 *
 * ```json
 * {"serverVersion": 3, "serverState": {...}, "attemptedState": {...}}
 * ```
 */

use crate::backend::error::types::BackendError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let BackendError::Conflict(report) = self {
            return (status, Json(*report)).into_response();
        }

        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.message(),
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
