/**
 * Document Store
 *
 * Durable, versioned storage for diagram documents, share grants and the
 * per-document history.
 *
 * # Backends
 *
 * - `Postgres` - the production backend (see `postgres.rs`); serialization
 *   of concurrent writers comes from `SELECT ... FOR UPDATE` inside a
 *   transaction
 * - `Memory` - an in-process backend with the same read-modify-write
 *   contract, used when no database is configured and by the test suite
 *
 * # Writes
 *
 * Every mutation of an existing document goes through [`DiagramStore::update_with`]:
 * the decision closure sees the current row while it is locked and either
 * commits a new state or rejects with a conflict. A commit bumps the version
 * by exactly one and appends a history entry in the same transaction.
 *
 * Every call is bounded by the configured store timeout.
 */

pub mod memory;
pub mod normalize;
pub mod postgres;

use crate::backend::merge::merge;
use crate::shared::{
    ConflictReport, Diagram, DiagramPatch, DiagramState, DiagramSummary, HistoryEntry,
    HistoryOperation, HistoryRetention, Permission, ShareGrant, SharedDiagramSummary,
};
use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Failure of the backing store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store did not answer within the configured bound
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Serialization failure, deadlock or exhausted pool; safe to retry
    #[error("transient store failure: {0}")]
    Transient(String),

    /// A stored row could not be decoded
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    #[error("store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A state to commit, decided while the row is locked
#[derive(Debug, Clone)]
pub struct Commit {
    /// Caller-visible state; normalized before it is persisted
    pub state: DiagramState,
    pub operation: HistoryOperation,
    pub actor: Option<Uuid>,
    pub metadata: Option<Value>,
}

/// Outcome of a decision closure
#[derive(Debug)]
pub enum WriteDecision {
    Commit(Commit),
    Reject(ConflictReport),
}

/// Result of a write against an existing document
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    /// Committed document carrying the caller-visible state
    Committed(Diagram),
    Conflict(ConflictReport),
}

/// Page of a history listing
#[derive(Debug, Clone, Copy)]
pub struct HistoryQuery {
    pub limit: i64,
    pub offset: i64,
    pub include_state: bool,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn new(limit: Option<i64>, offset: Option<i64>, include_state: bool) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
            include_state,
        }
    }
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self::new(None, None, false)
    }
}

/// Parse a document identifier
///
/// Only the canonical hyphenated UUID form is accepted. Anything else is
/// treated as an absent document without touching storage.
pub fn parse_diagram_id(raw: &str) -> Option<Uuid> {
    if raw.len() != 36 {
        return None;
    }
    Uuid::try_parse(raw).ok()
}

#[derive(Clone)]
enum Backend {
    Postgres(PgStore),
    Memory(MemoryStore),
}

/// Facade over the configured storage backend
#[derive(Clone)]
pub struct DiagramStore {
    backend: Backend,
    timeout: Duration,
    retention: HistoryRetention,
}

impl DiagramStore {
    pub fn postgres(pool: sqlx::PgPool, timeout: Duration, retention: HistoryRetention) -> Self {
        Self {
            backend: Backend::Postgres(PgStore::new(pool)),
            timeout,
            retention,
        }
    }

    pub fn memory(timeout: Duration, retention: HistoryRetention) -> Self {
        Self::with_memory(MemoryStore::default(), timeout, retention)
    }

    /// Memory store sharing tables with an existing handle
    pub fn with_memory(store: MemoryStore, timeout: Duration, retention: HistoryRetention) -> Self {
        Self {
            backend: Backend::Memory(store),
            timeout,
            retention,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Postgres(_) => "postgres",
            Backend::Memory(_) => "memory",
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Insert a new document at version 1
    pub async fn create(
        &self,
        state: DiagramState,
        owner_id: Option<Uuid>,
        actor: Option<Uuid>,
    ) -> StoreResult<Diagram> {
        let now = Utc::now();
        let diagram = Diagram {
            id: Uuid::new_v4(),
            owner_id,
            version: 1,
            state,
            created_at: now,
            updated_at: now,
        };
        let stored = normalize::for_storage(&diagram.state);

        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.insert(&diagram, &stored, actor).await,
                Backend::Memory(store) => store.insert(&diagram, &stored, actor).await,
            }
        })
        .await?;

        tracing::debug!("[Store] Created diagram {} (owner {:?})", diagram.id, owner_id);
        Ok(diagram)
    }

    /// Fetch a document by raw identifier
    pub async fn get(&self, raw_id: &str) -> StoreResult<Option<Diagram>> {
        match parse_diagram_id(raw_id) {
            Some(id) => self.get_by_id(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Diagram>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.get(id).await,
                Backend::Memory(store) => store.get(id).await,
            }
        })
        .await
    }

    /// Transactional read-modify-write of one document
    ///
    /// `decide` runs while the document is locked. Returns `None` if the
    /// document does not exist.
    pub async fn update_with<F>(&self, id: Uuid, decide: F) -> StoreResult<Option<WriteOutcome>>
    where
        F: FnOnce(&Diagram) -> WriteDecision + Send,
    {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.update_with(id, decide).await,
                Backend::Memory(store) => store.update_with(id, decide).await,
            }
        })
        .await
    }

    /// Unconditional replace (last writer wins)
    pub async fn replace(
        &self,
        id: Uuid,
        state: DiagramState,
        actor: Option<Uuid>,
    ) -> StoreResult<Option<Diagram>> {
        self.replace_as(id, state, actor, HistoryOperation::Replace, None)
            .await
    }

    /// Unconditional replace recorded under a specific history operation
    pub async fn replace_as(
        &self,
        id: Uuid,
        state: DiagramState,
        actor: Option<Uuid>,
        operation: HistoryOperation,
        metadata: Option<Value>,
    ) -> StoreResult<Option<Diagram>> {
        let outcome = self
            .update_with(id, move |_| {
                WriteDecision::Commit(Commit {
                    state,
                    operation,
                    actor,
                    metadata,
                })
            })
            .await?;

        Ok(outcome.and_then(|outcome| match outcome {
            WriteOutcome::Committed(diagram) => Some(diagram),
            WriteOutcome::Conflict(_) => None,
        }))
    }

    /// Replace only if the stored version equals `expected_version`
    pub async fn replace_guarded(
        &self,
        id: Uuid,
        expected_version: i64,
        state: DiagramState,
        actor: Option<Uuid>,
    ) -> StoreResult<Option<WriteOutcome>> {
        self.update_with(id, move |current| {
            match ConflictReport::detect(current, expected_version, &state) {
                Some(report) => WriteDecision::Reject(report),
                None => WriteDecision::Commit(Commit {
                    state,
                    operation: HistoryOperation::Replace,
                    actor,
                    metadata: None,
                }),
            }
        })
        .await
    }

    /// Merge a patch into the stored state
    ///
    /// With `expected_version`, a mismatch is rejected and the report's
    /// `attemptedState` is the patch merged onto the server state.
    pub async fn patch(
        &self,
        id: Uuid,
        patch: &DiagramPatch,
        expected_version: Option<i64>,
        actor: Option<Uuid>,
    ) -> StoreResult<Option<WriteOutcome>> {
        self.update_with(id, move |current| {
            let merged = merge(&current.state, patch);
            if let Some(expected) = expected_version {
                if let Some(report) = ConflictReport::detect(current, expected, &merged) {
                    return WriteDecision::Reject(report);
                }
            }
            WriteDecision::Commit(Commit {
                state: merged,
                operation: HistoryOperation::Patch,
                actor,
                metadata: None,
            })
        })
        .await
    }

    /// Delete a document and its grants
    ///
    /// History is kept or removed according to the configured retention.
    pub async fn delete(&self, id: Uuid) -> StoreResult<Option<Diagram>> {
        let cascade = self.retention == HistoryRetention::Cascade;
        let deleted = self
            .bounded(async {
                match &self.backend {
                    Backend::Postgres(store) => store.delete(id, cascade).await,
                    Backend::Memory(store) => store.delete(id, cascade).await,
                }
            })
            .await?;

        if deleted.is_some() {
            tracing::debug!("[Store] Deleted diagram {} (history cascade: {})", id, cascade);
        }
        Ok(deleted)
    }

    /// Diagrams owned by `owner_id`, most recently updated first
    pub async fn list_owned(&self, owner_id: Uuid) -> StoreResult<Vec<DiagramSummary>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.list_owned(owner_id).await,
                Backend::Memory(store) => store.list_owned(owner_id).await,
            }
        })
        .await
    }

    /// Diagrams shared with `grantee_id`, most recently updated first
    pub async fn list_shared_with(&self, grantee_id: Uuid) -> StoreResult<Vec<SharedDiagramSummary>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.list_shared_with(grantee_id).await,
                Backend::Memory(store) => store.list_shared_with(grantee_id).await,
            }
        })
        .await
    }

    pub async fn find_grant(&self, diagram_id: Uuid, grantee_id: Uuid) -> StoreResult<Option<ShareGrant>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.find_grant(diagram_id, grantee_id).await,
                Backend::Memory(store) => store.find_grant(diagram_id, grantee_id).await,
            }
        })
        .await
    }

    pub async fn list_grants(&self, diagram_id: Uuid) -> StoreResult<Vec<ShareGrant>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.list_grants(diagram_id).await,
                Backend::Memory(store) => store.list_grants(diagram_id).await,
            }
        })
        .await
    }

    /// Create or update one grant per grantee
    pub async fn upsert_grants(
        &self,
        diagram_id: Uuid,
        grantee_ids: &[Uuid],
        permission: Permission,
        can_copy: bool,
    ) -> StoreResult<Vec<ShareGrant>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => {
                    store
                        .upsert_grants(diagram_id, grantee_ids, permission, can_copy)
                        .await
                }
                Backend::Memory(store) => {
                    store
                        .upsert_grants(diagram_id, grantee_ids, permission, can_copy)
                        .await
                }
            }
        })
        .await
    }

    /// Remove a grant; returns whether one existed
    pub async fn revoke_grant(&self, diagram_id: Uuid, grantee_id: Uuid) -> StoreResult<bool> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.revoke_grant(diagram_id, grantee_id).await,
                Backend::Memory(store) => store.revoke_grant(diagram_id, grantee_id).await,
            }
        })
        .await
    }

    /// History of one document, newest first
    pub async fn list_history(&self, diagram_id: Uuid, query: HistoryQuery) -> StoreResult<Vec<HistoryEntry>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.list_history(diagram_id, query).await,
                Backend::Memory(store) => store.list_history(diagram_id, query).await,
            }
        })
        .await
    }

    /// One history entry including its state
    pub async fn get_history_entry(&self, diagram_id: Uuid, entry_id: Uuid) -> StoreResult<Option<HistoryEntry>> {
        self.bounded(async {
            match &self.backend {
                Backend::Postgres(store) => store.get_history_entry(diagram_id, entry_id).await,
                Backend::Memory(store) => store.get_history_entry(diagram_id, entry_id).await,
            }
        })
        .await
    }
}
