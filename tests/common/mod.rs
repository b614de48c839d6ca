//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - In-memory application instances, single or clustered over a local bus
//! - Authentication test helpers
//! - Diagram state builders

pub mod app;
pub mod auth_helpers;
pub mod fixtures;

pub use app::*;
pub use auth_helpers::*;
pub use fixtures::*;
