/**
 * PostgreSQL Backend
 *
 * SQL for the document store. Tables are created by `migrations/`.
 *
 * # Serialization
 *
 * Writes to an existing document run in a transaction that starts with
 * `SELECT ... FOR UPDATE` on the document row. Concurrent writers to the
 * same document queue on the row lock; writers to different documents do
 * not contend. The history row is inserted in the same transaction.
 *
 * # Errors
 *
 * Serialization failures (`40001`), deadlocks (`40P01`) and pool timeouts
 * map to `StoreError::Transient`; undecodable rows map to
 * `StoreError::Corrupt`.
 */

use super::normalize;
use super::{Commit, HistoryQuery, StoreError, StoreResult, WriteDecision, WriteOutcome};
use crate::shared::{
    Diagram, DiagramState, DiagramSummary, HistoryEntry, HistoryOperation, Permission, ShareGrant,
    SharedDiagramSummary,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Transient(db_err.message().to_string()),
                _ => StoreError::Backend(err.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Transient(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct DiagramRow {
    id: Uuid,
    owner_user_id: Option<Uuid>,
    version: i64,
    state: Json<DiagramState>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DiagramRow> for Diagram {
    fn from(row: DiagramRow) -> Self {
        Diagram {
            id: row.id,
            owner_id: row.owner_user_id,
            version: row.version,
            state: row.state.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    owner_user_id: Option<Uuid>,
    version: i64,
    diagram_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SummaryRow> for DiagramSummary {
    fn from(row: SummaryRow) -> Self {
        DiagramSummary {
            id: row.id,
            owner_id: row.owner_user_id,
            version: row.version,
            diagram_name: row.diagram_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SharedSummaryRow {
    #[sqlx(flatten)]
    summary: SummaryRow,
    permission: String,
    can_copy: bool,
}

#[derive(sqlx::FromRow)]
struct GrantRow {
    diagram_id: Uuid,
    grantee_user_id: Uuid,
    permission: String,
    can_copy: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GrantRow> for ShareGrant {
    type Error = StoreError;

    fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
        Ok(ShareGrant {
            diagram_id: row.diagram_id,
            grantee_id: row.grantee_user_id,
            permission: row.permission.parse().map_err(StoreError::Corrupt)?,
            can_copy: row.can_copy,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    diagram_id: Uuid,
    version: i64,
    operation: String,
    user_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
    state: Option<Json<DiagramState>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry {
            id: row.id,
            diagram_id: row.diagram_id,
            version: row.version,
            operation: row.operation.parse().map_err(StoreError::Corrupt)?,
            actor_id: row.user_id,
            metadata: row.metadata,
            state: row.state.map(|json| json.0),
            created_at: row.created_at,
        })
    }
}

const SUMMARY_COLUMNS: &str = "d.id, d.owner_user_id, d.version, d.state->>'diagramName' AS diagram_name, d.created_at, d.updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(super) async fn insert(
        &self,
        diagram: &Diagram,
        stored: &DiagramState,
        actor: Option<Uuid>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO diagrams (id, owner_user_id, version, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(diagram.id)
        .bind(diagram.owner_id)
        .bind(diagram.version)
        .bind(Json(stored))
        .bind(diagram.created_at)
        .bind(diagram.updated_at)
        .execute(&mut *tx)
        .await?;

        append_history(
            &mut tx,
            diagram.id,
            diagram.version,
            stored,
            HistoryOperation::Create,
            actor,
            None,
            diagram.created_at,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub(super) async fn get(&self, id: Uuid) -> StoreResult<Option<Diagram>> {
        let row = sqlx::query_as::<_, DiagramRow>(
            r#"
            SELECT id, owner_user_id, version, state, created_at, updated_at
            FROM diagrams
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Diagram::from))
    }

    pub(super) async fn update_with<F>(&self, id: Uuid, decide: F) -> StoreResult<Option<WriteOutcome>>
    where
        F: FnOnce(&Diagram) -> WriteDecision + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DiagramRow>(
            r#"
            SELECT id, owner_user_id, version, state, created_at, updated_at
            FROM diagrams
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        // Dropping `tx` rolls back and releases the lock
        let Some(row) = row else {
            return Ok(None);
        };
        let current = Diagram::from(row);

        let Commit {
            state,
            operation,
            actor,
            metadata,
        } = match decide(&current) {
            WriteDecision::Reject(report) => return Ok(Some(WriteOutcome::Conflict(report))),
            WriteDecision::Commit(commit) => commit,
        };

        let stored = normalize::for_storage(&state);
        let next_version = current.version + 1;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE diagrams
            SET state = $2, version = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&stored))
        .bind(next_version)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        append_history(
            &mut tx,
            id,
            next_version,
            &stored,
            operation,
            actor,
            metadata.as_ref(),
            now,
        )
        .await?;

        tx.commit().await?;

        Ok(Some(WriteOutcome::Committed(Diagram {
            version: next_version,
            state,
            updated_at: now,
            ..current
        })))
    }

    pub(super) async fn delete(&self, id: Uuid, cascade_history: bool) -> StoreResult<Option<Diagram>> {
        let mut tx = self.pool.begin().await?;

        // Shares go with the row (ON DELETE CASCADE)
        let row = sqlx::query_as::<_, DiagramRow>(
            r#"
            DELETE FROM diagrams
            WHERE id = $1
            RETURNING id, owner_user_id, version, state, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if row.is_some() && cascade_history {
            sqlx::query("DELETE FROM diagram_history WHERE diagram_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(row.map(Diagram::from))
    }

    pub(super) async fn list_owned(&self, owner_id: Uuid) -> StoreResult<Vec<DiagramSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM diagrams d WHERE d.owner_user_id = $1 ORDER BY d.updated_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DiagramSummary::from).collect())
    }

    pub(super) async fn list_shared_with(&self, grantee_id: Uuid) -> StoreResult<Vec<SharedDiagramSummary>> {
        let rows = sqlx::query_as::<_, SharedSummaryRow>(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS}, s.permission, s.can_copy
            FROM diagram_shares s
            JOIN diagrams d ON d.id = s.diagram_id
            WHERE s.grantee_user_id = $1
            ORDER BY d.updated_at DESC
            "#
        ))
        .bind(grantee_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SharedDiagramSummary {
                    diagram: row.summary.into(),
                    permission: row.permission.parse().map_err(StoreError::Corrupt)?,
                    can_copy: row.can_copy,
                })
            })
            .collect()
    }

    pub(super) async fn find_grant(&self, diagram_id: Uuid, grantee_id: Uuid) -> StoreResult<Option<ShareGrant>> {
        let row = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT diagram_id, grantee_user_id, permission, can_copy, created_at, updated_at
            FROM diagram_shares
            WHERE diagram_id = $1 AND grantee_user_id = $2
            "#,
        )
        .bind(diagram_id)
        .bind(grantee_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ShareGrant::try_from).transpose()
    }

    pub(super) async fn list_grants(&self, diagram_id: Uuid) -> StoreResult<Vec<ShareGrant>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT diagram_id, grantee_user_id, permission, can_copy, created_at, updated_at
            FROM diagram_shares
            WHERE diagram_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(diagram_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ShareGrant::try_from).collect()
    }

    pub(super) async fn upsert_grants(
        &self,
        diagram_id: Uuid,
        grantee_ids: &[Uuid],
        permission: Permission,
        can_copy: bool,
    ) -> StoreResult<Vec<ShareGrant>> {
        let mut tx = self.pool.begin().await?;
        let mut granted = Vec::with_capacity(grantee_ids.len());

        for grantee_id in grantee_ids {
            let row = sqlx::query_as::<_, GrantRow>(
                r#"
                INSERT INTO diagram_shares (diagram_id, grantee_user_id, permission, can_copy, created_at, updated_at)
                VALUES ($1, $2, $3, $4, NOW(), NOW())
                ON CONFLICT (diagram_id, grantee_user_id) DO UPDATE SET
                    permission = EXCLUDED.permission,
                    can_copy = EXCLUDED.can_copy,
                    updated_at = NOW()
                RETURNING diagram_id, grantee_user_id, permission, can_copy, created_at, updated_at
                "#,
            )
            .bind(diagram_id)
            .bind(grantee_id)
            .bind(permission.as_str())
            .bind(can_copy)
            .fetch_one(&mut *tx)
            .await?;
            granted.push(ShareGrant::try_from(row)?);
        }

        tx.commit().await?;
        Ok(granted)
    }

    pub(super) async fn revoke_grant(&self, diagram_id: Uuid, grantee_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM diagram_shares WHERE diagram_id = $1 AND grantee_user_id = $2",
        )
        .bind(diagram_id)
        .bind(grantee_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub(super) async fn list_history(&self, diagram_id: Uuid, query: HistoryQuery) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, diagram_id, version, operation, user_id, metadata,
                   CASE WHEN $4 THEN state ELSE NULL END AS state,
                   created_at
            FROM diagram_history
            WHERE diagram_id = $1
            ORDER BY created_at DESC, version DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(diagram_id)
        .bind(query.limit)
        .bind(query.offset)
        .bind(query.include_state)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    pub(super) async fn get_history_entry(&self, diagram_id: Uuid, entry_id: Uuid) -> StoreResult<Option<HistoryEntry>> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, diagram_id, version, operation, user_id, metadata, state, created_at
            FROM diagram_history
            WHERE id = $1 AND diagram_id = $2
            "#,
        )
        .bind(entry_id)
        .bind(diagram_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(HistoryEntry::try_from).transpose()
    }
}

#[allow(clippy::too_many_arguments)]
async fn append_history(
    conn: &mut PgConnection,
    diagram_id: Uuid,
    version: i64,
    state: &DiagramState,
    operation: HistoryOperation,
    actor: Option<Uuid>,
    metadata: Option<&serde_json::Value>,
    created_at: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO diagram_history (id, diagram_id, version, state, operation, user_id, metadata, created_at)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(diagram_id)
    .bind(version)
    .bind(Json(state))
    .bind(operation.as_str())
    .bind(actor)
    .bind(metadata)
    .bind(created_at)
    .execute(conn)
    .await?;

    Ok(())
}
