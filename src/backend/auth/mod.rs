//! Authentication and Authorization Module
//!
//! # Module Structure
//!
//! ```text
//! auth/
//! ├── mod.rs          - Module exports and documentation
//! ├── identity.rs     - Caller identity and roles
//! ├── sessions.rs     - JWT token management
//! └── authorizer.rs   - Read/write/manage decisions per document
//! ```
//!
//! Identities are stateless: they come from a verified JWT, and a missing or
//! invalid token means an anonymous caller. Whether an anonymous caller may
//! proceed is decided per document by the authorizer.

/// Caller identity
pub mod identity;

/// JWT token generation and validation
pub mod sessions;

/// Access decisions
pub mod authorizer;

pub use authorizer::{Access, Authorizer};
pub use identity::{Identity, ADMIN_ROLE};
pub use sessions::{Claims, SessionKeys, TokenError};
