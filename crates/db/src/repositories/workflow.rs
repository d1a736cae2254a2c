use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use greenlight_core::domain::actor::ChainRole;
use greenlight_core::domain::entity::{
    ApprovalFlag, ApprovalState, Department, EntityId, EntityKind, FlagMap, OverallStatus,
};
use greenlight_core::workflow::{ApprovalStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

/// Approval store over `workflow_entity` plus its `approval_decision` rows.
///
/// Writes run in one transaction with a version-guarded UPDATE; a guard that
/// matches zero rows on an existing entity means another writer advanced it
/// first and surfaces as `Conflict`.
#[derive(Clone)]
pub struct SqlApprovalStore {
    pool: DbPool,
}

impl SqlApprovalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) async fn insert_state(&self, state: &ApprovalState) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workflow_entity (id, kind, title, amount, created_by,
                                          creator_department, requires_approval,
                                          overall_status, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&state.id.0)
        .bind(state.kind.as_str())
        .bind(&state.title)
        .bind(state.amount.map(|amount| amount.to_string()))
        .bind(&state.created_by)
        .bind(state.creator_department.as_str())
        .bind(state.requires_approval)
        .bind(state.overall_status.as_str())
        .bind(state.version)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_state(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<Option<ApprovalState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, kind, title, amount, created_by, creator_department,
                    requires_approval, overall_status, version, created_at, updated_at
             FROM workflow_entity WHERE id = ? AND kind = ?",
        )
        .bind(&id.0)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut state = row_to_state(&row)?;
        state.flags = self.load_flags(id).await?;
        Ok(Some(state))
    }

    async fn load_flags(&self, id: &EntityId) -> Result<FlagMap, RepositoryError> {
        let rows = sqlx::query(
            "SELECT slot, decision, actor_id, decided_at
             FROM approval_decision WHERE entity_id = ?",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut flags = FlagMap::new();
        for row in &rows {
            let (slot, flag) = row_to_flag(row)?;
            flags.set(slot, flag);
        }
        Ok(flags)
    }

    async fn apply_decision(
        &self,
        kind: EntityKind,
        id: &EntityId,
        slot: ChainRole,
        flag: ApprovalFlag,
        new_status: OverallStatus,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let (decision, actor_id, decided_at) = match flag {
            ApprovalFlag::Approved { actor_id, decided_at } => ("approved", actor_id, decided_at),
            ApprovalFlag::Rejected { actor_id, decided_at } => ("rejected", actor_id, decided_at),
            ApprovalFlag::Unset => {
                return Err(RepositoryError::Decode(
                    "cannot persist an unset approval flag".to_string(),
                ))
            }
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE workflow_entity
             SET overall_status = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND kind = ? AND version = ?",
        )
        .bind(new_status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(kind.as_str())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict { entity_id: id.0.clone() });
        }

        sqlx::query(
            "INSERT INTO approval_decision (entity_id, slot, decision, actor_id, decided_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(slot.as_str())
        .bind(decision)
        .bind(&actor_id)
        .bind(decided_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        new_status: OverallStatus,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            "UPDATE workflow_entity
             SET overall_status = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND kind = ? AND version = ?",
        )
        .bind(new_status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(kind.as_str())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Conflict { entity_id: id.0.clone() });
        }
        Ok(())
    }
}

fn row_to_state(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalState, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let kind_str: String = row.try_get("kind").map_err(decode)?;
    let kind = EntityKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown entity kind `{kind_str}`")))?;

    let status_str: String = row.try_get("overall_status").map_err(decode)?;
    let overall_status = OverallStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_str}`")))?;

    let amount = row
        .try_get::<Option<String>, _>("amount")
        .map_err(decode)?
        .map(|raw| {
            raw.parse::<Decimal>()
                .map_err(|e| RepositoryError::Decode(format!("bad amount `{raw}`: {e}")))
        })
        .transpose()?;

    Ok(ApprovalState {
        id: EntityId(row.try_get("id").map_err(decode)?),
        kind,
        title: row.try_get("title").map_err(decode)?,
        amount,
        created_by: row.try_get("created_by").map_err(decode)?,
        creator_department: Department::new(
            row.try_get::<String, _>("creator_department").map_err(decode)?,
        ),
        requires_approval: row.try_get("requires_approval").map_err(decode)?,
        flags: FlagMap::new(),
        overall_status,
        version: row.try_get("version").map_err(decode)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at").map_err(decode)?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at").map_err(decode)?)?,
    })
}

fn row_to_flag(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(ChainRole, ApprovalFlag), RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let slot_str: String = row.try_get("slot").map_err(decode)?;
    let slot = ChainRole::parse(&slot_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown chain slot `{slot_str}`")))?;

    let actor_id: String = row.try_get("actor_id").map_err(decode)?;
    let decided_at = parse_timestamp(&row.try_get::<String, _>("decided_at").map_err(decode)?)?;

    let decision: String = row.try_get("decision").map_err(decode)?;
    let flag = match decision.as_str() {
        "approved" => ApprovalFlag::approved(actor_id, decided_at),
        "rejected" => ApprovalFlag::rejected(actor_id, decided_at),
        other => return Err(RepositoryError::Decode(format!("unknown decision `{other}`"))),
    };

    Ok((slot, flag))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp `{raw}`: {e}")))
}

#[async_trait]
impl ApprovalStore for SqlApprovalStore {
    async fn create_state(&self, state: ApprovalState) -> Result<(), StoreError> {
        Ok(self.insert_state(&state).await?)
    }

    async fn read_state(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<Option<ApprovalState>, StoreError> {
        Ok(self.find_state(kind, id).await?)
    }

    async fn record_decision(
        &self,
        kind: EntityKind,
        id: &EntityId,
        slot: ChainRole,
        flag: ApprovalFlag,
        new_status: OverallStatus,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        Ok(self.apply_decision(kind, id, slot, flag, new_status, expected_version).await?)
    }

    async fn record_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        new_status: OverallStatus,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        Ok(self.apply_status(kind, id, new_status, expected_version).await?)
    }
}
