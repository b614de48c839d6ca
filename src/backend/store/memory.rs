//! In-memory backend
//!
//! All tables live behind one `tokio::sync::RwLock`, so a write holds the
//! lock across its whole read-decide-write step. That gives the same
//! serialization guarantee as the Postgres row lock (stricter, since all
//! documents share the lock).

use super::normalize;
use super::{Commit, HistoryQuery, StoreError, StoreResult, WriteDecision, WriteOutcome};
use crate::shared::{
    Diagram, DiagramState, DiagramSummary, HistoryEntry, HistoryOperation, Permission, ShareGrant,
    SharedDiagramSummary,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    /// Rows hold the normalized (stored) state
    diagrams: HashMap<Uuid, Diagram>,
    shares: BTreeMap<(Uuid, Uuid), ShareGrant>,
    /// Append-only, in commit order
    history: Vec<HistoryEntry>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    failures: Arc<AtomicU32>,
}

impl MemoryStore {
    /// Make the next `count` writes fail with a transient error
    pub fn inject_transient_failures(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Hold the write lock for `duration`, stalling every other call
    #[cfg(test)]
    pub(crate) async fn stall_for(&self, duration: std::time::Duration) {
        let _tables = self.tables.write().await;
        tokio::time::sleep(duration).await;
    }

    fn take_injected_failure(&self) -> StoreResult<()> {
        let result = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match result {
            Ok(_) => Err(StoreError::Transient("injected serialization failure".to_string())),
            Err(_) => Ok(()),
        }
    }

    pub(super) async fn insert(
        &self,
        diagram: &Diagram,
        stored: &DiagramState,
        actor: Option<Uuid>,
    ) -> StoreResult<()> {
        self.take_injected_failure()?;
        let mut tables = self.tables.write().await;
        let row = Diagram {
            state: stored.clone(),
            ..diagram.clone()
        };
        tables.history.push(history_entry(&row, HistoryOperation::Create, actor, None));
        tables.diagrams.insert(row.id, row);
        Ok(())
    }

    pub(super) async fn get(&self, id: Uuid) -> StoreResult<Option<Diagram>> {
        Ok(self.tables.read().await.diagrams.get(&id).cloned())
    }

    pub(super) async fn update_with<F>(&self, id: Uuid, decide: F) -> StoreResult<Option<WriteOutcome>>
    where
        F: FnOnce(&Diagram) -> WriteDecision + Send,
    {
        self.take_injected_failure()?;
        let mut tables = self.tables.write().await;
        let Some(current) = tables.diagrams.get(&id).cloned() else {
            return Ok(None);
        };

        let commit = match decide(&current) {
            WriteDecision::Reject(report) => return Ok(Some(WriteOutcome::Conflict(report))),
            WriteDecision::Commit(commit) => commit,
        };
        let Commit {
            state,
            operation,
            actor,
            metadata,
        } = commit;

        let row = Diagram {
            version: current.version + 1,
            state: normalize::for_storage(&state),
            updated_at: Utc::now(),
            ..current
        };
        tables.history.push(history_entry(&row, operation, actor, metadata));
        tables.diagrams.insert(id, row.clone());

        Ok(Some(WriteOutcome::Committed(Diagram { state, ..row })))
    }

    pub(super) async fn delete(&self, id: Uuid, cascade_history: bool) -> StoreResult<Option<Diagram>> {
        let mut tables = self.tables.write().await;
        let Some(removed) = tables.diagrams.remove(&id) else {
            return Ok(None);
        };
        tables.shares.retain(|(diagram_id, _), _| *diagram_id != id);
        if cascade_history {
            tables.history.retain(|entry| entry.diagram_id != id);
        }
        Ok(Some(removed))
    }

    pub(super) async fn list_owned(&self, owner_id: Uuid) -> StoreResult<Vec<DiagramSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<DiagramSummary> = tables
            .diagrams
            .values()
            .filter(|d| d.owner_id == Some(owner_id))
            .map(Diagram::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    pub(super) async fn list_shared_with(&self, grantee_id: Uuid) -> StoreResult<Vec<SharedDiagramSummary>> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<SharedDiagramSummary> = tables
            .shares
            .values()
            .filter(|grant| grant.grantee_id == grantee_id)
            .filter_map(|grant| {
                tables.diagrams.get(&grant.diagram_id).map(|d| SharedDiagramSummary {
                    diagram: d.summary(),
                    permission: grant.permission,
                    can_copy: grant.can_copy,
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.diagram.updated_at.cmp(&a.diagram.updated_at));
        Ok(summaries)
    }

    pub(super) async fn find_grant(&self, diagram_id: Uuid, grantee_id: Uuid) -> StoreResult<Option<ShareGrant>> {
        Ok(self
            .tables
            .read()
            .await
            .shares
            .get(&(diagram_id, grantee_id))
            .cloned())
    }

    pub(super) async fn list_grants(&self, diagram_id: Uuid) -> StoreResult<Vec<ShareGrant>> {
        let tables = self.tables.read().await;
        let mut grants: Vec<ShareGrant> = tables
            .shares
            .values()
            .filter(|grant| grant.diagram_id == diagram_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(grants)
    }

    pub(super) async fn upsert_grants(
        &self,
        diagram_id: Uuid,
        grantee_ids: &[Uuid],
        permission: Permission,
        can_copy: bool,
    ) -> StoreResult<Vec<ShareGrant>> {
        let mut tables = self.tables.write().await;
        if !tables.diagrams.contains_key(&diagram_id) {
            return Err(StoreError::Backend(format!(
                "grant references missing diagram {diagram_id}"
            )));
        }

        let now = Utc::now();
        let mut granted = Vec::with_capacity(grantee_ids.len());
        for grantee_id in grantee_ids {
            let grant = tables
                .shares
                .entry((diagram_id, *grantee_id))
                .and_modify(|grant| {
                    grant.permission = permission;
                    grant.can_copy = can_copy;
                    grant.updated_at = now;
                })
                .or_insert_with(|| ShareGrant {
                    diagram_id,
                    grantee_id: *grantee_id,
                    permission,
                    can_copy,
                    created_at: now,
                    updated_at: now,
                });
            granted.push(grant.clone());
        }
        Ok(granted)
    }

    pub(super) async fn revoke_grant(&self, diagram_id: Uuid, grantee_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .shares
            .remove(&(diagram_id, grantee_id))
            .is_some())
    }

    pub(super) async fn list_history(&self, diagram_id: Uuid, query: HistoryQuery) -> StoreResult<Vec<HistoryEntry>> {
        let tables = self.tables.read().await;
        let entries = tables
            .history
            .iter()
            .rev()
            .filter(|entry| entry.diagram_id == diagram_id)
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|entry| {
                if query.include_state {
                    entry.clone()
                } else {
                    entry.clone().without_state()
                }
            })
            .collect();
        Ok(entries)
    }

    pub(super) async fn get_history_entry(&self, diagram_id: Uuid, entry_id: Uuid) -> StoreResult<Option<HistoryEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .find(|entry| entry.id == entry_id && entry.diagram_id == diagram_id)
            .cloned())
    }
}

fn history_entry(
    row: &Diagram,
    operation: HistoryOperation,
    actor: Option<Uuid>,
    metadata: Option<serde_json::Value>,
) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4(),
        diagram_id: row.id,
        version: row.version,
        operation,
        actor_id: actor,
        metadata,
        state: Some(row.state.clone()),
        created_at: row.updated_at,
    }
}
