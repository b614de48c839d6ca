/**
 * Diagram Service
 *
 * Request-level operations on diagrams: authorization, validation, the
 * store call, bounded retries of transient failures and the realtime
 * publish of every commit.
 *
 * # Retries
 *
 * `apply` and guarded `replace` are retried up to `store_retries` times on
 * transient storage errors. Each attempt re-reads the document inside a new
 * transaction, so a retry never merges against stale state. A stale
 * `expectedVersion` simply yields a fresh conflict.
 *
 * # Publishing
 *
 * After a commit the new document is pushed as an `update` frame; a delete
 * pushes a `deleted` frame. Publishing never fails the write.
 */

use crate::backend::auth::{Access, Authorizer, Identity};
use crate::backend::error::BackendError;
use crate::backend::realtime::{Fanout, Subscription};
use crate::backend::store::{parse_diagram_id, DiagramStore, HistoryQuery, StoreError, WriteOutcome};
use crate::shared::{
    Diagram, DiagramPatch, DiagramState, DiagramSummary, HistoryEntry, HistoryOperation,
    Permission, ShareGrant, SharedDiagramSummary, UpdateFrame,
};
use std::future::Future;
use uuid::Uuid;

#[derive(Clone)]
pub struct DiagramService {
    store: DiagramStore,
    authorizer: Authorizer,
    fanout: Fanout,
    retries: u32,
}

fn require_identity(identity: Option<&Identity>) -> Result<&Identity, BackendError> {
    identity.ok_or(BackendError::Unauthenticated)
}

fn require_state<T>(state: Option<T>) -> Result<T, BackendError> {
    state.ok_or_else(|| BackendError::validation("state", "missing state"))
}

fn parse_id(raw: &str) -> Result<Uuid, BackendError> {
    parse_diagram_id(raw).ok_or(BackendError::NotFound)
}

impl DiagramService {
    pub fn new(store: DiagramStore, fanout: Fanout, retries: u32) -> Self {
        Self {
            authorizer: Authorizer::new(store.clone()),
            store,
            fanout,
            retries,
        }
    }

    pub fn store(&self) -> &DiagramStore {
        &self.store
    }

    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    /// Load a document and check `required` access for the caller
    async fn load_authorized(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        required: Access,
    ) -> Result<Diagram, BackendError> {
        let id = parse_id(raw_id)?;
        let diagram = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(BackendError::NotFound)?;
        self.authorizer.require(identity, &diagram, required).await?;
        Ok(diagram)
    }

    async fn with_retries<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retried = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let err = BackendError::from(e);
                    if !err.is_retryable() || retried >= self.retries {
                        return Err(err);
                    }
                    retried += 1;
                    tracing::warn!(
                        "[Diagrams] {} hit a transient failure, retry {}/{}: {}",
                        operation,
                        retried,
                        self.retries,
                        err
                    );
                }
            }
        }
    }

    fn publish_update(&self, diagram: &Diagram) {
        match serde_json::to_value(diagram) {
            Ok(payload) => self.fanout.publish(&UpdateFrame::update(diagram.id, payload)),
            Err(e) => tracing::error!("[Diagrams] Failed to encode update for {}: {}", diagram.id, e),
        }
    }

    fn committed(&self, outcome: Option<WriteOutcome>) -> Result<Diagram, BackendError> {
        match outcome {
            Some(WriteOutcome::Committed(diagram)) => {
                self.publish_update(&diagram);
                Ok(diagram)
            }
            Some(WriteOutcome::Conflict(report)) => {
                tracing::info!(
                    "[Diagrams] Conflict: server is at version {}",
                    report.server_version
                );
                Err(BackendError::conflict(report))
            }
            None => Err(BackendError::NotFound),
        }
    }

    /// Create a diagram at version 1
    ///
    /// Non-admins always own what they create. Admins may name an owner or
    /// leave the diagram unowned.
    pub async fn create(
        &self,
        identity: Option<&Identity>,
        state: Option<DiagramState>,
        owner_id: Option<Uuid>,
    ) -> Result<Diagram, BackendError> {
        let caller = require_identity(identity)?;
        let state = require_state(state)?;
        state.validate()?;

        let owner = if caller.is_admin() {
            owner_id
        } else {
            Some(caller.id)
        };

        let diagram = self.store.create(state, owner, Some(caller.id)).await?;
        tracing::info!("[Diagrams] Created {} for owner {:?}", diagram.id, diagram.owner_id);
        Ok(diagram)
    }

    pub async fn read(&self, identity: Option<&Identity>, raw_id: &str) -> Result<Diagram, BackendError> {
        self.load_authorized(identity, raw_id, Access::Read).await
    }

    /// Replace the whole state
    ///
    /// Without `expected_version` this always wins (force-overwrite). With
    /// it, a version mismatch is returned as a conflict.
    pub async fn replace(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        state: Option<DiagramState>,
        expected_version: Option<i64>,
    ) -> Result<Diagram, BackendError> {
        let state = require_state(state)?;
        state.validate()?;
        let current = self.load_authorized(identity, raw_id, Access::Write).await?;
        let actor = identity.map(|i| i.id);
        let store = &self.store;

        let outcome = match expected_version {
            Some(expected) => {
                self.with_retries("replace", move || {
                    store.replace_guarded(current.id, expected, state.clone(), actor)
                })
                .await?
            }
            None => store
                .replace(current.id, state, actor)
                .await?
                .map(WriteOutcome::Committed),
        };

        self.committed(outcome)
    }

    /// Merge a patch into the stored state
    pub async fn apply(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        patch: Option<DiagramPatch>,
        expected_version: Option<i64>,
    ) -> Result<Diagram, BackendError> {
        let patch = require_state(patch)?;
        patch.validate()?;
        let current = self.load_authorized(identity, raw_id, Access::Write).await?;
        let actor = identity.map(|i| i.id);
        let store = &self.store;
        let patch = &patch;

        let outcome = self
            .with_retries("apply", move || {
                store.patch(current.id, patch, expected_version, actor)
            })
            .await?;

        self.committed(outcome)
    }

    /// Delete a diagram and close its subscriptions everywhere
    pub async fn remove(&self, identity: Option<&Identity>, raw_id: &str) -> Result<Diagram, BackendError> {
        let current = self.load_authorized(identity, raw_id, Access::Manage).await?;
        let deleted = self
            .store
            .delete(current.id)
            .await?
            .ok_or(BackendError::NotFound)?;

        self.fanout.publish(&UpdateFrame::deleted(deleted.id));
        tracing::info!("[Diagrams] Deleted {}", deleted.id);
        Ok(deleted)
    }

    pub async fn grant(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        grantee_ids: Vec<Uuid>,
        permission: Permission,
        can_copy: bool,
    ) -> Result<Vec<ShareGrant>, BackendError> {
        let diagram = self.load_authorized(identity, raw_id, Access::Manage).await?;

        let mut grantees: Vec<Uuid> = Vec::with_capacity(grantee_ids.len());
        for grantee in grantee_ids {
            if Some(grantee) == diagram.owner_id {
                return Err(BackendError::validation(
                    "granteeIds",
                    "the owner cannot be a grantee",
                ));
            }
            if !grantees.contains(&grantee) {
                grantees.push(grantee);
            }
        }
        if grantees.is_empty() {
            return Err(BackendError::validation("granteeIds", "at least one grantee is required"));
        }

        let grants = self
            .store
            .upsert_grants(diagram.id, &grantees, permission, can_copy)
            .await?;
        tracing::info!(
            "[Diagrams] Granted {} on {} to {} user(s)",
            permission,
            diagram.id,
            grants.len()
        );
        Ok(grants)
    }

    pub async fn revoke(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        raw_grantee: &str,
    ) -> Result<(), BackendError> {
        let diagram = self.load_authorized(identity, raw_id, Access::Manage).await?;
        let grantee = parse_id(raw_grantee)?;

        if self.store.revoke_grant(diagram.id, grantee).await? {
            tracing::info!("[Diagrams] Revoked grant on {} for {}", diagram.id, grantee);
            Ok(())
        } else {
            Err(BackendError::NotFound)
        }
    }

    pub async fn list_grants(&self, identity: Option<&Identity>, raw_id: &str) -> Result<Vec<ShareGrant>, BackendError> {
        let diagram = self.load_authorized(identity, raw_id, Access::Manage).await?;
        Ok(self.store.list_grants(diagram.id).await?)
    }

    pub async fn list_shared_with_me(&self, identity: Option<&Identity>) -> Result<Vec<SharedDiagramSummary>, BackendError> {
        let caller = require_identity(identity)?;
        Ok(self.store.list_shared_with(caller.id).await?)
    }

    pub async fn list_mine(&self, identity: Option<&Identity>) -> Result<Vec<DiagramSummary>, BackendError> {
        let caller = require_identity(identity)?;
        Ok(self.store.list_owned(caller.id).await?)
    }

    pub async fn list_history(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        query: HistoryQuery,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        let diagram = self.load_authorized(identity, raw_id, Access::Read).await?;
        Ok(self.store.list_history(diagram.id, query).await?)
    }

    pub async fn get_history_entry(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        raw_entry: &str,
    ) -> Result<HistoryEntry, BackendError> {
        let diagram = self.load_authorized(identity, raw_id, Access::Read).await?;
        let entry_id = parse_id(raw_entry)?;
        self.store
            .get_history_entry(diagram.id, entry_id)
            .await?
            .ok_or(BackendError::NotFound)
    }

    /// Replace the current state with an archived snapshot
    pub async fn restore(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
        raw_entry: &str,
    ) -> Result<Diagram, BackendError> {
        let diagram = self.load_authorized(identity, raw_id, Access::Write).await?;
        let entry_id = parse_id(raw_entry)?;
        let entry = self
            .store
            .get_history_entry(diagram.id, entry_id)
            .await?
            .ok_or(BackendError::NotFound)?;
        let state = entry
            .state
            .ok_or_else(|| BackendError::internal(format!("history entry {entry_id} has no state")))?;

        let restored = self
            .store
            .replace_as(
                diagram.id,
                state,
                identity.map(|i| i.id),
                HistoryOperation::Restore,
                Some(serde_json::json!({ "restoredFrom": entry_id })),
            )
            .await?
            .ok_or(BackendError::NotFound)?;

        tracing::info!(
            "[Diagrams] Restored {} to entry {} (version {})",
            diagram.id,
            entry_id,
            restored.version
        );
        self.publish_update(&restored);
        Ok(restored)
    }

    /// Open a realtime subscription for the caller
    ///
    /// The subscriber is registered before access is checked, so a delete
    /// committed concurrently either fails the check or closes the
    /// subscription. Grants are re-checked on every subscribe.
    pub async fn subscribe(
        &self,
        identity: Option<&Identity>,
        raw_id: &str,
    ) -> Result<Subscription, BackendError> {
        let id = parse_id(raw_id)?;
        let mut subscription = self.fanout.subscribe(id);
        if let Err(e) = self.load_authorized(identity, raw_id, Access::Read).await {
            subscription.close();
            return Err(e);
        }
        Ok(subscription)
    }
}
