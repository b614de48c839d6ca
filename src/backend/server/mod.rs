//! Server Module
//!
//! Initialization and state of the Axum server.
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs     - Module exports and documentation
//! ├── state.rs   - AppState and FromRef implementations
//! ├── config.rs  - Database and bus loading
//! └── init.rs    - Application creation
//! ```

/// Application state management
pub mod state;

/// Database and bus loading
pub mod config;

/// Server initialization
pub mod init;

pub use init::{build_state, create_app};
pub use state::AppState;
