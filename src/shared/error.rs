//! Shared Error Types
//!
//! This module defines error types that are shared between the server and
//! clients of the diagram API. They describe payloads that are malformed
//! before any storage or authorization concern comes into play.
//!
//! # Error Categories
//!
//! - `ValidationError` - State or patch shape violations
//!
//! # Usage
//!
//! ```rust
//! use diagramsync::shared::error::SharedError;
//!
//! let error = SharedError::validation("diagramName", "Diagram name cannot be blank");
//! assert!(error.to_string().contains("diagramName"));
//! ```
use thiserror::Error;

/// Shared error types that can occur on both sides of the wire
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}
