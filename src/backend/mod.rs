//! Backend Module
//!
//! Server-side code: storage, authorization, the merge engine, realtime
//! fanout and the Axum HTTP surface. Compiled only with the `ssr` feature.
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs       - Module exports and documentation
//! ├── server/      - Configuration loading, state, initialization
//! ├── routes/      - Route configuration
//! ├── diagrams/    - Diagram operations and handlers
//! ├── store/       - Document store (PostgreSQL or in-memory)
//! ├── merge.rs     - Additive patch merge
//! ├── realtime/    - Subscriptions, fanout, message bus, WebSocket
//! ├── auth/        - Identity, JWT sessions, access decisions
//! ├── middleware/  - Identity extraction
//! └── error/       - Error taxonomy and HTTP mapping
//! ```
//!
//! # Write Path
//!
//! A write is authorized, then committed by the store as one
//! read-decide-write transaction that also appends a history entry. Only
//! after the commit does the fanout publish the new state; a failed publish
//! never turns a committed write into an error.

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Diagram operations
pub mod diagrams;

/// Document persistence
pub mod store;

/// Additive patch merge
pub mod merge;

/// Real-time update system
pub mod realtime;

/// Backend error types
pub mod error;

/// Authentication and access decisions
pub mod auth;

/// Middleware for request processing
pub mod middleware;

pub use diagrams::DiagramService;
pub use error::BackendError;
pub use server::create_app;
