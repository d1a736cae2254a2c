use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{ActorProfile, ChainRole};
use crate::domain::entity::{ApprovalState, EntityId, EntityKind, FlagMap, OverallStatus};
use crate::errors::ActionError;
use crate::policy::engine::{PolicyAction, PolicyEngine};
use crate::workflow::ports::{ApprovalStore, IdentityDirectory};

/// Creation request for an approvable entity. The creator's department is
/// snapshotted from the directory at this moment and never re-read.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CreateEntity {
    pub kind: EntityKind,
    pub title: String,
    pub amount: Option<Decimal>,
    pub created_by: String,
    pub requires_approval: bool,
}

/// Result of one approve/reject/pay action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub decided_slot: Option<ChainRole>,
    pub overall_status: OverallStatus,
    pub next_approver: Option<ChainRole>,
}

/// One-request-per-action orchestrator: resolve the actor, read current
/// state, let the policy engine decide, persist atomically, emit the audit
/// trail. Holds no state of its own beyond the policy table.
pub struct WorkflowService<D, S> {
    directory: D,
    store: S,
    engine: PolicyEngine,
    audit: Arc<dyn AuditSink>,
}

impl<D, S> WorkflowService<D, S>
where
    D: IdentityDirectory,
    S: ApprovalStore,
{
    pub fn new(directory: D, store: S, engine: PolicyEngine, audit: Arc<dyn AuditSink>) -> Self {
        Self { directory, store, engine, audit }
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub async fn create(&self, request: CreateEntity) -> Result<ApprovalState, ActionError> {
        let creator = self.resolve(&request.created_by).await?;
        let now = Utc::now();
        let state = ApprovalState {
            id: EntityId(format!("{}-{}", kind_prefix(request.kind), Uuid::new_v4())),
            kind: request.kind,
            title: request.title,
            amount: request.amount,
            created_by: creator.id.clone(),
            creator_department: creator.department.clone(),
            requires_approval: request.requires_approval,
            flags: FlagMap::new(),
            overall_status: OverallStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.store.create_state(state.clone()).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(state.id.clone()),
                "create",
                "workflow.entity_created",
                AuditCategory::Ingress,
                creator.id,
                AuditOutcome::Success,
            )
            .with_metadata("kind", state.kind.as_str())
            .with_metadata("department", state.creator_department.as_str()),
        );
        Ok(state)
    }

    pub async fn state(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<ApprovalState, ActionError> {
        self.store
            .read_state(kind, id)
            .await?
            .ok_or_else(|| ActionError::EntityNotFound { kind, id: id.0.clone() })
    }

    /// Apply one approve/reject action end to end.
    pub async fn decide(
        &self,
        kind: EntityKind,
        id: &EntityId,
        actor_id: &str,
        action: PolicyAction,
        correlation_id: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let actor = self.resolve(actor_id).await?;
        let state = self.state(kind, id).await?;

        let decision = match self.engine.evaluate(&state, &actor, action, Utc::now()) {
            Ok(decision) => decision,
            Err(refusal) => {
                self.emit_refusal(&state, &actor, correlation_id, action.to_string(), &refusal);
                return Err(refusal.into());
            }
        };

        self.store
            .record_decision(
                kind,
                id,
                decision.slot,
                decision.flag.clone(),
                decision.new_status,
                state.version,
            )
            .await?;

        let mut updated = state;
        updated.flags.set(decision.slot, decision.flag);
        updated.overall_status = decision.new_status;
        updated.version += 1;

        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                correlation_id,
                "workflow.decision_applied",
                AuditCategory::Decision,
                actor.id,
                AuditOutcome::Success,
            )
            .with_metadata("action", action.to_string())
            .with_metadata("slot", decision.slot.as_str())
            .with_metadata("status", decision.new_status.as_str()),
        );

        Ok(ActionOutcome {
            entity_id: id.clone(),
            kind,
            decided_slot: Some(decision.slot),
            overall_status: decision.new_status,
            next_approver: self.engine.next_approver(&updated),
        })
    }

    /// Apply the one-shot memo payment transition.
    pub async fn pay(
        &self,
        id: &EntityId,
        actor_id: &str,
        correlation_id: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let actor = self.resolve(actor_id).await?;
        let state = self.state(EntityKind::Memo, id).await?;

        let new_status = match self.engine.evaluate_payment(&state, &actor) {
            Ok(new_status) => new_status,
            Err(refusal) => {
                self.emit_refusal(&state, &actor, correlation_id, "pay".to_string(), &refusal);
                return Err(refusal.into());
            }
        };

        self.store.record_status(EntityKind::Memo, id, new_status, state.version).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                correlation_id,
                "workflow.payment_applied",
                AuditCategory::Payment,
                actor.id,
                AuditOutcome::Success,
            )
            .with_metadata("status", new_status.as_str()),
        );

        Ok(ActionOutcome {
            entity_id: id.clone(),
            kind: EntityKind::Memo,
            decided_slot: None,
            overall_status: new_status,
            next_approver: None,
        })
    }

    async fn resolve(&self, actor_id: &str) -> Result<ActorProfile, ActionError> {
        self.directory
            .resolve_actor(actor_id)
            .await?
            .ok_or_else(|| ActionError::ActorNotFound { actor_id: actor_id.to_string() })
    }

    fn emit_refusal(
        &self,
        state: &ApprovalState,
        actor: &ActorProfile,
        correlation_id: &str,
        action: String,
        refusal: &crate::errors::WorkflowError,
    ) {
        self.audit.emit(
            AuditEvent::new(
                Some(state.id.clone()),
                correlation_id,
                "workflow.decision_refused",
                AuditCategory::Decision,
                actor.id.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("action", action)
            .with_metadata("reason", refusal.to_string()),
        );
    }
}

fn kind_prefix(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Memo => "MEMO",
        EntityKind::Requisition => "REQ",
        EntityKind::LeaveRequest => "LV",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::actor::{ActorProfile, ChainRole};
    use crate::domain::entity::{Department, EntityKind, OverallStatus};
    use crate::errors::{ActionError, WorkflowError};
    use crate::policy::engine::{PolicyAction, PolicyEngine};
    use crate::workflow::ports::{InMemoryApprovalStore, InMemoryIdentityDirectory};
    use crate::workflow::service::{CreateEntity, WorkflowService};

    fn staff() -> Vec<ActorProfile> {
        let actor = |id: &str, role: &str, department: &str| ActorProfile {
            id: id.to_string(),
            display_name: id.to_string(),
            role: role.to_string(),
            department: Department::new(department),
        };
        vec![
            actor("u-staff", "officer", "operations"),
            actor("u-fin-staff", "officer", "finance"),
            actor("u-mgr", "manager", "operations"),
            actor("u-exec", "executive", "hq"),
            actor("u-fin", "finance", "finance"),
            actor("u-gmd", "gmd", "hq"),
            actor("u-chair", "chairman", "hq"),
        ]
    }

    fn service(
        sink: InMemoryAuditSink,
    ) -> WorkflowService<InMemoryIdentityDirectory, InMemoryApprovalStore> {
        WorkflowService::new(
            InMemoryIdentityDirectory::with_actors(staff()),
            InMemoryApprovalStore::default(),
            PolicyEngine::standard(),
            Arc::new(sink),
        )
    }

    fn create_request(kind: EntityKind, created_by: &str) -> CreateEntity {
        CreateEntity {
            kind,
            title: "Quarterly stationery".to_string(),
            amount: None,
            created_by: created_by.to_string(),
            requires_approval: true,
        }
    }

    #[tokio::test]
    async fn full_memo_chain_approves_then_pays() {
        let sink = InMemoryAuditSink::default();
        let service = service(sink.clone());
        let memo = service
            .create(create_request(EntityKind::Memo, "u-staff"))
            .await
            .expect("create memo");

        for (actor, expected_next) in [
            ("u-mgr", Some(ChainRole::Executive)),
            ("u-exec", Some(ChainRole::Finance)),
            ("u-fin", Some(ChainRole::Gmd)),
            ("u-gmd", Some(ChainRole::Chairman)),
        ] {
            let outcome = service
                .decide(EntityKind::Memo, &memo.id, actor, PolicyAction::Approve, "req-1")
                .await
                .expect("chain approval");
            assert_eq!(outcome.overall_status, OverallStatus::InReview);
            assert_eq!(outcome.next_approver, expected_next);
        }

        let outcome = service
            .decide(EntityKind::Memo, &memo.id, "u-chair", PolicyAction::Approve, "req-1")
            .await
            .expect("chairman closes chain");
        assert_eq!(outcome.overall_status, OverallStatus::Approved);
        assert_eq!(outcome.next_approver, None);

        let paid = service.pay(&memo.id, "u-fin", "req-2").await.expect("finance pays");
        assert_eq!(paid.overall_status, OverallStatus::Completed);

        let second = service.pay(&memo.id, "u-fin", "req-3").await.expect_err("pay is one-shot");
        assert!(matches!(
            second,
            ActionError::Policy(WorkflowError::AlreadyTerminal { status: OverallStatus::Completed })
        ));

        let applied = sink
            .events()
            .iter()
            .filter(|event| event.event_type == "workflow.decision_applied")
            .count();
        assert_eq!(applied, 5);
    }

    #[tokio::test]
    async fn rejection_terminates_the_chain() {
        let service = service(InMemoryAuditSink::default());
        let requisition = service
            .create(create_request(EntityKind::Requisition, "u-staff"))
            .await
            .expect("create requisition");

        service
            .decide(EntityKind::Requisition, &requisition.id, "u-mgr", PolicyAction::Approve, "r")
            .await
            .expect("manager approves");
        let outcome = service
            .decide(EntityKind::Requisition, &requisition.id, "u-exec", PolicyAction::Reject, "r")
            .await
            .expect("executive rejects");
        assert_eq!(outcome.overall_status, OverallStatus::Rejected);
        assert_eq!(outcome.next_approver, None);

        let error = service
            .decide(EntityKind::Requisition, &requisition.id, "u-fin", PolicyAction::Approve, "r")
            .await
            .expect_err("rejected entity is closed");
        assert!(matches!(
            error,
            ActionError::Policy(WorkflowError::AlreadyTerminal { status: OverallStatus::Rejected })
        ));
    }

    #[tokio::test]
    async fn finance_created_requisition_skips_straight_to_finance() {
        let service = service(InMemoryAuditSink::default());
        let requisition = service
            .create(create_request(EntityKind::Requisition, "u-fin-staff"))
            .await
            .expect("create requisition as finance staff");
        assert_eq!(service.engine().next_approver(&requisition), Some(ChainRole::Finance));

        let error = service
            .decide(EntityKind::Requisition, &requisition.id, "u-mgr", PolicyAction::Approve, "r")
            .await
            .expect_err("manager slot skipped");
        assert!(matches!(
            error,
            ActionError::Policy(WorkflowError::NotApplicable { role: ChainRole::Manager, .. })
        ));

        let outcome = service
            .decide(EntityKind::Requisition, &requisition.id, "u-fin", PolicyAction::Approve, "r")
            .await
            .expect("finance approves with no dependency");
        assert_eq!(outcome.next_approver, Some(ChainRole::Gmd));
    }

    #[tokio::test]
    async fn unknown_actor_and_entity_are_not_found() {
        let service = service(InMemoryAuditSink::default());
        let memo =
            service.create(create_request(EntityKind::Memo, "u-staff")).await.expect("create");

        let error = service
            .decide(EntityKind::Memo, &memo.id, "u-ghost", PolicyAction::Approve, "r")
            .await
            .expect_err("unknown actor");
        assert!(matches!(error, ActionError::ActorNotFound { .. }));

        let error = service
            .decide(
                EntityKind::Requisition,
                &memo.id,
                "u-mgr",
                PolicyAction::Approve,
                "r",
            )
            .await
            .expect_err("memo id under requisition kind");
        assert!(matches!(error, ActionError::EntityNotFound { .. }));
    }

    #[tokio::test]
    async fn refusals_leave_an_audit_trail() {
        let sink = InMemoryAuditSink::default();
        let service = service(sink.clone());
        let memo =
            service.create(create_request(EntityKind::Memo, "u-staff")).await.expect("create");

        let _ = service
            .decide(EntityKind::Memo, &memo.id, "u-exec", PolicyAction::Approve, "req-9")
            .await
            .expect_err("dependency unmet");

        let refused: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|event| event.event_type == "workflow.decision_refused")
            .collect();
        assert_eq!(refused.len(), 1);
        assert_eq!(refused[0].correlation_id, "req-9");
        assert!(refused[0].metadata.get("reason").is_some_and(|r| r.contains("manager")));
    }
}
