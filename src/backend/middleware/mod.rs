//! Middleware Module
//!
//! Request processing shared by the HTTP and WebSocket handlers.
//!
//! - **`auth`** - resolves the caller identity from a JWT (header or cookie)

pub mod auth;

pub use auth::{extract_token, resolve_identity, MaybeIdentity, AUTH_COOKIE};
