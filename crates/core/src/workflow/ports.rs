use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::domain::actor::{ActorProfile, ChainRole};
use crate::domain::entity::{ApprovalFlag, ApprovalState, EntityId, EntityKind, OverallStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("identity lookup failed: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Backend(String),
    /// Another writer advanced the entity between our read and write. The
    /// caller may retry with a fresh read; the engine never retries itself.
    #[error("concurrent update detected for `{entity_id}`; retry with fresh state")]
    Conflict { entity_id: String },
}

/// Identity provider port: credential/actor id → role + department.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve_actor(&self, actor_id: &str) -> Result<Option<ActorProfile>, DirectoryError>;
}

/// Entity store port. Writes are atomic read-verify-write units guarded by
/// the state's `version`; a stale version yields `StoreError::Conflict`.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn create_state(&self, state: ApprovalState) -> Result<(), StoreError>;

    async fn read_state(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<Option<ApprovalState>, StoreError>;

    /// Persist one flag write together with the projected status.
    async fn record_decision(
        &self,
        kind: EntityKind,
        id: &EntityId,
        slot: ChainRole,
        flag: ApprovalFlag,
        new_status: OverallStatus,
        expected_version: i64,
    ) -> Result<(), StoreError>;

    /// Persist a status-only transition (memo payment).
    async fn record_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        new_status: OverallStatus,
        expected_version: i64,
    ) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryIdentityDirectory {
    actors: HashMap<String, ActorProfile>,
}

impl InMemoryIdentityDirectory {
    pub fn with_actors(actors: Vec<ActorProfile>) -> Self {
        Self { actors: actors.into_iter().map(|actor| (actor.id.clone(), actor)).collect() }
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn resolve_actor(&self, actor_id: &str) -> Result<Option<ActorProfile>, DirectoryError> {
        Ok(self.actors.get(actor_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApprovalStore {
    rows: Arc<Mutex<HashMap<(EntityKind, String), ApprovalState>>>,
}

impl InMemoryApprovalStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(EntityKind, String), ApprovalState>> {
        match self.rows.lock() {
            Ok(rows) => rows,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn create_state(&self, state: ApprovalState) -> Result<(), StoreError> {
        let mut rows = self.lock();
        let key = (state.kind, state.id.0.clone());
        if rows.contains_key(&key) {
            return Err(StoreError::Backend(format!("entity `{}` already exists", state.id)));
        }
        rows.insert(key, state);
        Ok(())
    }

    async fn read_state(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<Option<ApprovalState>, StoreError> {
        Ok(self.lock().get(&(kind, id.0.clone())).cloned())
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
        let mut rows = self.lock();
        let Some(state) = rows.get_mut(&(kind, id.0.clone())) else {
            return Err(StoreError::Backend(format!("entity `{id}` vanished mid-write")));
        };
        if state.version != expected_version {
            return Err(StoreError::Conflict { entity_id: id.0.clone() });
        }
        state.flags.set(slot, flag);
        state.overall_status = new_status;
        state.version += 1;
        state.updated_at = Utc::now();
        Ok(())
    }

    async fn record_status(
        &self,
        kind: EntityKind,
        id: &EntityId,
        new_status: OverallStatus,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut rows = self.lock();
        let Some(state) = rows.get_mut(&(kind, id.0.clone())) else {
            return Err(StoreError::Backend(format!("entity `{id}` vanished mid-write")));
        };
        if state.version != expected_version {
            return Err(StoreError::Conflict { entity_id: id.0.clone() });
        }
        state.overall_status = new_status;
        state.version += 1;
        state.updated_at = Utc::now();
        Ok(())
    }
}
