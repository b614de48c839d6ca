//! Backend Error Module
//!
//! This module defines error types specific to the backend server.
//! These errors are used by the diagram service and its HTTP handlers and
//! convert to HTTP responses.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error taxonomy
//! └── conversion.rs - IntoResponse implementation
//! ```
//!
//! Degraded cross-instance fanout is deliberately absent from the
//! taxonomy: it is logged and counted, never returned to a writer.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use types::BackendError;
