//! diagramsync - Collaborative Diagram Document Service
//!
//! Stores JSON diagram documents with a monotonically increasing version,
//! merges additive patches, detects concurrent overwrites, and pushes every
//! committed change to live subscribers across server instances.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared by the server and its clients
//!   - Diagram state tree and patch types
//!   - Realtime frames, conflict reports, the client edit session
//!   - Configuration and validation errors
//!
//! - **`backend`** - Server-side code (only compiled with `ssr`)
//!   - Document store (PostgreSQL or in-memory) with history
//!   - Access decisions, JWT identities
//!   - Fanout over WebSockets and a cross-instance message bus
//!
//! # Feature Flags
//!
//! - **`ssr`** (default) - the backend and the `diagramsync-server` binary
//!
//! # Usage
//!
//! ```rust,no_run
//! use diagramsync::backend::server::init::create_app;
//! use diagramsync::shared::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let (app, _fanout) = create_app(config).await;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
