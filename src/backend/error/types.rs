/**
 * Backend Error Types
 *
 * This module defines the error taxonomy of the diagram service. Every
 * variant maps to an HTTP status and a short machine-readable kind.
 *
 * # Error Categories
 *
 * ## Terminal
 *
 * Returned directly to the caller:
 * - `NotFound` - absent document or history entry, or an identifier that is
 *   not well formed (never reported separately)
 * - `Forbidden` - authenticated but lacking permission
 * - `Unauthenticated` - no usable identity for a document that needs one
 * - `Validation` - malformed state or patch
 *
 * ## Conflict
 *
 * A guarded write hit a version mismatch. This is a first-class response
 * carrying both snapshots, not a failure.
 *
 * ## Transient
 *
 * `TransientStorage` covers timeouts and serialization failures of the
 * backing store; the whole read-merge-write may be retried with fresh state.
 */

use crate::backend::store::StoreError;
use crate::shared::{ConflictReport, SharedError};
use axum::http::StatusCode;
use thiserror::Error;

/// Backend-specific error types
///
/// # Usage
///
/// ```rust
/// use diagramsync::backend::error::BackendError;
///
/// let err = BackendError::forbidden("Only the owner can manage shares");
/// assert_eq!(err.kind(), "forbidden");
/// ```
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Authentication required")]
    Unauthenticated,

    /// Version mismatch on a guarded write
    #[error("Version conflict (server is at version {})", .0.server_version)]
    Conflict(Box<ConflictReport>),

    #[error(transparent)]
    Validation(#[from] SharedError),

    /// Timeout or serialization failure; safe to retry
    #[error("Storage temporarily unavailable: {message}")]
    TransientStorage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BackendError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(SharedError::validation(field, message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn conflict(report: ConflictReport) -> Self {
        Self::Conflict(Box::new(report))
    }

    /// Whether the failed operation may be retried unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage { .. })
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `NotFound` - 404
    /// - `Forbidden` - 403
    /// - `Unauthenticated` - 401
    /// - `Conflict` - 409
    /// - `Validation` - 400
    /// - `TransientStorage` - 503
    /// - `Internal` - 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::TransientStorage { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Unauthenticated => "unauthenticated",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation",
            Self::TransientStorage { .. } => "transient_storage",
            Self::Internal { .. } => "internal",
        }
    }

    /// Human-readable error message
    pub fn message(&self) -> String {
        match self {
            Self::Forbidden { message } => message.clone(),
            Self::Validation(err) => err.to_string(),
            Self::TransientStorage { message } => message.clone(),
            // Internal details stay in the logs
            Self::Internal { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(elapsed) => Self::TransientStorage {
                message: format!("storage did not answer within {} ms", elapsed.as_millis()),
            },
            StoreError::Transient(message) => Self::TransientStorage { message },
            StoreError::Corrupt(message) | StoreError::Backend(message) => {
                tracing::error!("[Store] {}", message);
                Self::Internal { message }
            }
        }
    }
}
