//! Shared Module
//!
//! This module contains types and data structures that are shared between
//! the server and its clients: the diagram state tree, document records,
//! realtime frames and the conflict protocol. All types are designed for
//! serialization over the HTTP and WebSocket APIs.

/// Typed diagram state and patches
pub mod diagram;

/// Versioned documents, grants and history entries
pub mod document;

/// Version-gated writes and their resolution
pub mod conflict;

/// Realtime frames
pub mod event;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use diagram::{Connector, DiagramPatch, DiagramState, Shape, Sheet, SheetPatch};
pub use document::{
    Diagram, DiagramSummary, HistoryEntry, HistoryOperation, Permission, ShareGrant,
    SharedDiagramSummary,
};
pub use conflict::{ConflictReport, EditSession, GuardedWrite, Resolution, ResolutionAction};
pub use event::{FrameKind, SubscribeRequest, UpdateFrame};
pub use error::SharedError;
pub use config::{AppConfig, AppConfigBuilder, BusKind, ConfigError, HistoryRetention};
