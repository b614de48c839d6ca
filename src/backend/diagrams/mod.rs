//! Diagram Module
//!
//! The request-level diagram operations and their HTTP handlers.
//!
//! # Module Structure
//!
//! ```text
//! diagrams/
//! ├── mod.rs       - Module exports and documentation
//! ├── service.rs   - Authorization, retries and publishing around the store
//! ├── handlers.rs  - axum handlers
//! └── types.rs     - Request bodies and query strings
//! ```

pub mod handlers;
pub mod service;
pub mod types;

pub use service::DiagramService;
pub use types::{ApplyPatchRequest, CreateDiagramRequest, GrantRequest, HistoryParams, ReplaceDiagramRequest};
