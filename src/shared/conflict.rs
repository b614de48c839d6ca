//! # Conflict Protocol
//!
//! Version-gated writes and their explicit resolution.
//!
//! A guarded write carries the version the writer last observed. When the
//! stored version differs, the write is rejected with a [`ConflictReport`]
//! holding both snapshots. Nothing is merged automatically: the writer
//! picks a [`Resolution`].
//!
//! - **AcceptServer**: drop the local attempt and continue from the server
//!   snapshot
//! - **ForceOverwrite**: resubmit the local attempt as an unconditional
//!   replace (last writer wins, deliberately)
//!
//! [`EditSession`] is the client-side bookkeeping for this protocol.

use crate::shared::diagram::DiagramState;
use crate::shared::document::Diagram;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body returned when a guarded write hits a version mismatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub server_version: i64,
    pub server_state: DiagramState,
    pub attempted_state: DiagramState,
}

impl ConflictReport {
    /// Compare an expected version against the stored document
    ///
    /// Returns `None` when the write may proceed.
    pub fn detect(current: &Diagram, expected_version: i64, attempted: &DiagramState) -> Option<Self> {
        if current.version == expected_version {
            return None;
        }
        Some(Self {
            server_version: current.version,
            server_state: current.state.clone(),
            attempted_state: attempted.clone(),
        })
    }
}

/// Choice made by the conflicted party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    AcceptServer,
    ForceOverwrite,
}

/// What the client has to do after resolving
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionAction {
    /// Local state now mirrors the server at this version; nothing to send
    Adopted { version: i64 },
    /// Send this state with an unconditional replace
    ForceOverwrite { state: DiagramState },
}

/// A guarded full-state write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardedWrite {
    pub expected_version: i64,
    pub state: DiagramState,
}

/// Client-side view of one open document
#[derive(Debug, Clone)]
pub struct EditSession {
    document_id: Uuid,
    base_version: i64,
    state: DiagramState,
    conflict: Option<ConflictReport>,
}

impl EditSession {
    /// Start editing from a fetched document
    pub fn open(diagram: &Diagram) -> Self {
        Self {
            document_id: diagram.id,
            base_version: diagram.version,
            state: diagram.state.clone(),
            conflict: None,
        }
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Version the next guarded write will be checked against
    pub fn base_version(&self) -> i64 {
        self.base_version
    }

    pub fn state(&self) -> &DiagramState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DiagramState {
        &mut self.state
    }

    pub fn conflict(&self) -> Option<&ConflictReport> {
        self.conflict.as_ref()
    }

    /// Build the guarded write for the current local state
    ///
    /// Returns `None` while a conflict is waiting for a resolution.
    pub fn save_request(&self) -> Option<GuardedWrite> {
        if self.conflict.is_some() {
            return None;
        }
        Some(GuardedWrite {
            expected_version: self.base_version,
            state: self.state.clone(),
        })
    }

    /// Record a successful write (guarded, forced or patch)
    pub fn committed(&mut self, diagram: &Diagram) {
        self.base_version = diagram.version;
        self.state = diagram.state.clone();
        self.conflict = None;
    }

    /// Record a rejected guarded write
    pub fn conflicted(&mut self, report: ConflictReport) {
        self.conflict = Some(report);
    }

    /// Resolve the open conflict
    ///
    /// Returns `None` if there is no conflict to resolve.
    pub fn resolve(&mut self, resolution: Resolution) -> Option<ResolutionAction> {
        let report = self.conflict.take()?;
        match resolution {
            Resolution::AcceptServer => {
                self.base_version = report.server_version;
                self.state = report.server_state;
                Some(ResolutionAction::Adopted {
                    version: self.base_version,
                })
            }
            Resolution::ForceOverwrite => Some(ResolutionAction::ForceOverwrite {
                state: report.attempted_state,
            }),
        }
    }
}
