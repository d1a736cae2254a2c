use thiserror::Error;

use crate::domain::actor::ChainRole;
use crate::domain::entity::{EntityKind, OverallStatus};
use crate::workflow::ports::{DirectoryError, StoreError};

/// Policy-level refusals. Every variant carries enough context to build the
/// human-readable reason the API returns.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("role `{role}` holds no slot in the {kind} approval chain")]
    RoleNotRecognized { role: String, kind: EntityKind },
    #[error("`{role}` approval is skipped for entities created by the {department} department")]
    NotApplicable { role: ChainRole, department: String },
    #[error("`{role}` has already decided this entity")]
    AlreadyDecided { role: ChainRole },
    #[error("`{role}` cannot decide before `{waiting_on}` has approved")]
    DependencyUnmet { role: ChainRole, waiting_on: ChainRole },
    #[error("entity is already {status}; no further decisions are accepted")]
    AlreadyTerminal { status: OverallStatus },
    #[error("payment requires status `approved` but entity is `{from}`")]
    InvalidStateTransition { from: OverallStatus },
    #[error("entity was created without approval gating")]
    ApprovalNotRequired,
    #[error("no approval chain is defined for kind `{kind}`")]
    ChainNotDefined { kind: EntityKind },
    #[error("payment is not supported for kind `{kind}`")]
    PaymentNotSupported { kind: EntityKind },
}

/// Errors surfaced by one workflow action end to end: lookup misses, policy
/// refusals, and collaborator failures.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{kind} `{id}` was not found")]
    EntityNotFound { kind: EntityKind, id: String },
    #[error("actor `{actor_id}` was not found in the staff directory")]
    ActorNotFound { actor_id: String },
    #[error(transparent)]
    Policy(#[from] WorkflowError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl ActionError {
    /// Whether the caller may retry the identical request and expect it to
    /// succeed. Only optimistic-lock conflicts qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}
