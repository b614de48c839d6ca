//! Route Configuration Module
//!
//! # Module Structure
//!
//! ```text
//! routes/
//! ├── mod.rs         - Module exports and documentation
//! ├── router.rs      - Main router creation
//! └── api_routes.rs  - Diagram, share and history endpoints
//! ```

/// Main router creation
pub mod router;

/// API endpoint registration
pub mod api_routes;

pub use router::create_router;
