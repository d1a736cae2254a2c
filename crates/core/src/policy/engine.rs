use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{ActorProfile, ChainRole};
use crate::domain::entity::{ApprovalFlag, ApprovalState, OverallStatus};
use crate::errors::WorkflowError;
use crate::policy::projector::project;
use crate::policy::table::{EntityChain, PolicyTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Approve,
    Reject,
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        })
    }
}

/// Outcome of a permitted decision: which slot to write, the flag value,
/// and the overall status the entity lands in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub slot: ChainRole,
    pub flag: ApprovalFlag,
    pub new_status: OverallStatus,
}

/// The single authoritative decision point for "may role R perform action A
/// on entity E, and what does the entity become".
///
/// Pure over its inputs; persistence is the caller's concern and must apply
/// the returned decision atomically.
#[derive(Clone, Debug)]
pub struct PolicyEngine {
    table: PolicyTable,
}

impl PolicyEngine {
    pub fn new(table: PolicyTable) -> Self {
        Self { table }
    }

    pub fn standard() -> Self {
        Self::new(PolicyTable::standard())
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    /// Evaluate an approve/reject action. Checks run in a fixed order so
    /// the caller always sees the most specific refusal:
    /// gating → terminal state → role → applicability → idempotence →
    /// dependency.
    pub fn evaluate(
        &self,
        state: &ApprovalState,
        actor: &ActorProfile,
        action: PolicyAction,
        decided_at: DateTime<Utc>,
    ) -> Result<PolicyDecision, WorkflowError> {
        if !state.requires_approval {
            return Err(WorkflowError::ApprovalNotRequired);
        }
        if !state.overall_status.admits_decisions() {
            return Err(WorkflowError::AlreadyTerminal { status: state.overall_status });
        }

        let chain = self.chain(state)?;
        let role = actor
            .chain_role()
            .and_then(|role| chain.step_for(role).map(|step| (role, step)));
        let Some((role, step)) = role else {
            return Err(WorkflowError::RoleNotRecognized {
                role: actor.role.clone(),
                kind: state.kind,
            });
        };

        if step.applicability.is_skipped(&state.creator_department) {
            return Err(WorkflowError::NotApplicable {
                role,
                department: state.creator_department.as_str().to_string(),
            });
        }

        if state.flags.get(role).is_decided() {
            return Err(WorkflowError::AlreadyDecided { role });
        }

        if let Some(waiting_on) = step.depends_on.resolve(&state.creator_department) {
            let satisfied = state.flags.get(waiting_on).is_approved()
                || chain
                    .step_for(waiting_on)
                    .is_some_and(|dep| dep.applicability.is_skipped(&state.creator_department));
            if !satisfied {
                return Err(WorkflowError::DependencyUnmet { role, waiting_on });
            }
        }

        let flag = match action {
            PolicyAction::Approve => ApprovalFlag::approved(actor.id.clone(), decided_at),
            PolicyAction::Reject => ApprovalFlag::rejected(actor.id.clone(), decided_at),
        };

        // Rejection is terminal immediately; approval re-projects the chain.
        let new_status = match action {
            PolicyAction::Reject => OverallStatus::Rejected,
            PolicyAction::Approve => {
                let flags = state.flags.clone().with(role, flag.clone());
                project(chain, &state.creator_department, &flags)
            }
        };

        Ok(PolicyDecision { slot: role, flag, new_status })
    }

    /// Evaluate the one-shot memo payment transition (`approved` →
    /// `completed`), restricted to the finance role.
    pub fn evaluate_payment(
        &self,
        state: &ApprovalState,
        actor: &ActorProfile,
    ) -> Result<OverallStatus, WorkflowError> {
        if !state.kind.supports_payment() {
            return Err(WorkflowError::PaymentNotSupported { kind: state.kind });
        }
        if !state.requires_approval {
            return Err(WorkflowError::ApprovalNotRequired);
        }
        if actor.chain_role() != Some(ChainRole::Finance) {
            return Err(WorkflowError::RoleNotRecognized {
                role: actor.role.clone(),
                kind: state.kind,
            });
        }

        match state.overall_status {
            OverallStatus::Approved => Ok(OverallStatus::Completed),
            OverallStatus::Completed => {
                Err(WorkflowError::AlreadyTerminal { status: OverallStatus::Completed })
            }
            from => Err(WorkflowError::InvalidStateTransition { from }),
        }
    }

    /// The next role whose decision the chain is waiting on, if any. Used
    /// for the `next_approver` hint in action responses.
    pub fn next_approver(&self, state: &ApprovalState) -> Option<ChainRole> {
        if !state.requires_approval || !state.overall_status.admits_decisions() {
            return None;
        }
        let chain = self.table.chain(state.kind)?;

        chain
            .applicable_steps(&state.creator_department)
            .find(|step| {
                if state.flags.get(step.slot).is_decided() {
                    return false;
                }
                match step.depends_on.resolve(&state.creator_department) {
                    None => true,
                    Some(waiting_on) => {
                        state.flags.get(waiting_on).is_approved()
                            || chain.step_for(waiting_on).is_some_and(|dep| {
                                dep.applicability.is_skipped(&state.creator_department)
                            })
                    }
                }
            })
            .map(|step| step.slot)
    }

    fn chain(&self, state: &ApprovalState) -> Result<&EntityChain, WorkflowError> {
        self.table.chain(state.kind).ok_or(WorkflowError::ChainNotDefined { kind: state.kind })
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::actor::{ActorProfile, ChainRole};
    use crate::domain::entity::{
        ApprovalFlag, ApprovalState, Department, EntityId, EntityKind, FlagMap, OverallStatus,
    };
    use crate::errors::WorkflowError;
    use crate::policy::engine::{PolicyAction, PolicyEngine};

    fn actor(id: &str, role: &str, department: &str) -> ActorProfile {
        ActorProfile {
            id: id.to_string(),
            display_name: id.to_string(),
            role: role.to_string(),
            department: Department::new(department),
        }
    }

    fn state(kind: EntityKind, creator_department: &str) -> ApprovalState {
        let now = Utc::now();
        ApprovalState {
            id: EntityId("ENT-001".to_string()),
            kind,
            title: "Office chairs".to_string(),
            amount: None,
            created_by: "u-creator".to_string(),
            creator_department: Department::new(creator_department),
            requires_approval: true,
            flags: FlagMap::new(),
            overall_status: OverallStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn with_approvals(mut state: ApprovalState, roles: &[ChainRole]) -> ApprovalState {
        for role in roles {
            state.flags.set(*role, ApprovalFlag::approved(format!("u-{role}"), Utc::now()));
        }
        state
    }

    #[test]
    fn manager_approves_first_on_a_standard_requisition() {
        let engine = PolicyEngine::standard();
        let requisition = state(EntityKind::Requisition, "operations");

        let decision = engine
            .evaluate(&requisition, &actor("u-mgr", "manager", "operations"), PolicyAction::Approve, Utc::now())
            .expect("manager should be allowed to approve first");

        assert_eq!(decision.slot, ChainRole::Manager);
        assert!(decision.flag.is_approved());
        assert_eq!(decision.new_status, OverallStatus::InReview);
    }

    #[test]
    fn executive_is_blocked_until_manager_has_approved() {
        let engine = PolicyEngine::standard();
        let requisition = state(EntityKind::Requisition, "operations");

        let error = engine
            .evaluate(&requisition, &actor("u-exec", "executive", "hq"), PolicyAction::Approve, Utc::now())
            .expect_err("executive must wait for manager");

        assert_eq!(
            error,
            WorkflowError::DependencyUnmet {
                role: ChainRole::Executive,
                waiting_on: ChainRole::Manager,
            }
        );
    }

    #[test]
    fn finance_creators_skip_manager_and_executive() {
        let engine = PolicyEngine::standard();
        let requisition = state(EntityKind::Requisition, "finance");

        let manager_error = engine
            .evaluate(&requisition, &actor("u-mgr", "manager", "operations"), PolicyAction::Approve, Utc::now())
            .expect_err("manager slot is skipped");
        assert!(matches!(manager_error, WorkflowError::NotApplicable { role: ChainRole::Manager, .. }));

        let decision = engine
            .evaluate(&requisition, &actor("u-fin", "finance", "finance"), PolicyAction::Approve, Utc::now())
            .expect("finance decides first with no dependency");
        assert_eq!(decision.slot, ChainRole::Finance);
        assert_eq!(decision.new_status, OverallStatus::InReview);
    }

    #[test]
    fn gmd_requires_finance_even_when_earlier_stages_are_skipped() {
        let engine = PolicyEngine::standard();
        let requisition = state(EntityKind::Requisition, "finance");

        let error = engine
            .evaluate(&requisition, &actor("u-gmd", "gmd", "hq"), PolicyAction::Approve, Utc::now())
            .expect_err("gmd waits on finance");
        assert_eq!(
            error,
            WorkflowError::DependencyUnmet { role: ChainRole::Gmd, waiting_on: ChainRole::Finance }
        );

        let after_finance =
            with_approvals(state(EntityKind::Requisition, "finance"), &[ChainRole::Finance]);
        let mut after_finance = after_finance;
        after_finance.overall_status = OverallStatus::InReview;

        let decision = engine
            .evaluate(&after_finance, &actor("u-gmd", "gmd", "hq"), PolicyAction::Approve, Utc::now())
            .expect("gmd approves directly after finance");
        assert_eq!(decision.slot, ChainRole::Gmd);
    }

    #[test]
    fn ict_creators_gate_finance_behind_the_executive() {
        let engine = PolicyEngine::standard();
        let memo = state(EntityKind::Memo, "ict");

        let error = engine
            .evaluate(&memo, &actor("u-fin", "finance", "finance"), PolicyAction::Approve, Utc::now())
            .expect_err("finance waits on executive for ict entities");
        assert_eq!(
            error,
            WorkflowError::DependencyUnmet {
                role: ChainRole::Finance,
                waiting_on: ChainRole::Executive,
            }
        );

        let mut cleared =
            with_approvals(state(EntityKind::Memo, "ict"), &[ChainRole::Manager, ChainRole::Executive]);
        cleared.overall_status = OverallStatus::InReview;
        let decision = engine
            .evaluate(&cleared, &actor("u-fin", "finance", "finance"), PolicyAction::Approve, Utc::now())
            .expect("finance proceeds once executive approved");
        assert_eq!(decision.slot, ChainRole::Finance);
    }

    #[test]
    fn a_role_cannot_decide_its_slot_twice() {
        let engine = PolicyEngine::standard();
        let mut requisition =
            with_approvals(state(EntityKind::Requisition, "operations"), &[ChainRole::Manager]);
        requisition.overall_status = OverallStatus::InReview;

        let error = engine
            .evaluate(&requisition, &actor("u-mgr", "manager", "operations"), PolicyAction::Approve, Utc::now())
            .expect_err("second decision by the same role is refused");
        assert_eq!(error, WorkflowError::AlreadyDecided { role: ChainRole::Manager });

        let error = engine
            .evaluate(&requisition, &actor("u-mgr", "manager", "operations"), PolicyAction::Reject, Utc::now())
            .expect_err("flipping an already-set flag is refused too");
        assert_eq!(error, WorkflowError::AlreadyDecided { role: ChainRole::Manager });
    }

    #[test]
    fn rejection_is_terminal_and_blocks_every_later_action() {
        let engine = PolicyEngine::standard();
        let requisition = state(EntityKind::Requisition, "operations");

        let decision = engine
            .evaluate(&requisition, &actor("u-mgr", "manager", "operations"), PolicyAction::Reject, Utc::now())
            .expect("manager may reject");
        assert_eq!(decision.new_status, OverallStatus::Rejected);

        let mut rejected = requisition;
        rejected.flags.set(decision.slot, decision.flag);
        rejected.overall_status = decision.new_status;

        let error = engine
            .evaluate(&rejected, &actor("u-exec", "executive", "hq"), PolicyAction::Approve, Utc::now())
            .expect_err("no decisions after terminal rejection");
        assert_eq!(error, WorkflowError::AlreadyTerminal { status: OverallStatus::Rejected });
    }

    #[test]
    fn unknown_roles_are_refused() {
        let engine = PolicyEngine::standard();
        let memo = state(EntityKind::Memo, "operations");

        let error = engine
            .evaluate(&memo, &actor("u-acct", "accountant", "finance"), PolicyAction::Approve, Utc::now())
            .expect_err("accountant holds no chain slot");
        assert!(matches!(error, WorkflowError::RoleNotRecognized { .. }));
    }

    #[test]
    fn chairman_is_refused_on_leave_requests() {
        let engine = PolicyEngine::standard();
        let leave = state(EntityKind::LeaveRequest, "operations");

        let error = engine
            .evaluate(&leave, &actor("u-chair", "chairman", "hq"), PolicyAction::Approve, Utc::now())
            .expect_err("leave chain has no chairman slot");
        assert!(matches!(
            error,
            WorkflowError::RoleNotRecognized { kind: EntityKind::LeaveRequest, .. }
        ));
    }

    #[test]
    fn ungated_entities_refuse_decisions() {
        let engine = PolicyEngine::standard();
        let mut memo = state(EntityKind::Memo, "operations");
        memo.requires_approval = false;

        let error = engine
            .evaluate(&memo, &actor("u-mgr", "manager", "operations"), PolicyAction::Approve, Utc::now())
            .expect_err("ungated entity");
        assert_eq!(error, WorkflowError::ApprovalNotRequired);
    }

    #[test]
    fn full_chain_approval_lands_on_approved() {
        let engine = PolicyEngine::standard();
        let mut memo = with_approvals(
            state(EntityKind::Memo, "operations"),
            &[ChainRole::Manager, ChainRole::Executive, ChainRole::Finance, ChainRole::Gmd],
        );
        memo.overall_status = OverallStatus::InReview;

        let decision = engine
            .evaluate(&memo, &actor("u-chair", "chairman", "hq"), PolicyAction::Approve, Utc::now())
            .expect("chairman closes the chain");
        assert_eq!(decision.new_status, OverallStatus::Approved);
    }

    #[test]
    fn payment_succeeds_only_from_approved() {
        let engine = PolicyEngine::standard();
        let mut memo = with_approvals(
            state(EntityKind::Memo, "operations"),
            &[
                ChainRole::Manager,
                ChainRole::Executive,
                ChainRole::Finance,
                ChainRole::Gmd,
                ChainRole::Chairman,
            ],
        );
        memo.overall_status = OverallStatus::Approved;

        let status = engine
            .evaluate_payment(&memo, &actor("u-fin", "finance", "finance"))
            .expect("finance marks the approved memo paid");
        assert_eq!(status, OverallStatus::Completed);
    }

    #[test]
    fn payment_from_in_review_is_an_invalid_transition() {
        let engine = PolicyEngine::standard();
        let mut memo =
            with_approvals(state(EntityKind::Memo, "operations"), &[ChainRole::Manager]);
        memo.overall_status = OverallStatus::InReview;

        let error = engine
            .evaluate_payment(&memo, &actor("u-fin", "finance", "finance"))
            .expect_err("payment before approval");
        assert_eq!(
            error,
            WorkflowError::InvalidStateTransition { from: OverallStatus::InReview }
        );
    }

    #[test]
    fn payment_is_one_shot_and_finance_only() {
        let engine = PolicyEngine::standard();
        let mut memo = state(EntityKind::Memo, "operations");
        memo.overall_status = OverallStatus::Completed;

        let error = engine
            .evaluate_payment(&memo, &actor("u-fin", "finance", "finance"))
            .expect_err("completed memo cannot be paid again");
        assert_eq!(error, WorkflowError::AlreadyTerminal { status: OverallStatus::Completed });

        let mut approved_memo = state(EntityKind::Memo, "operations");
        approved_memo.overall_status = OverallStatus::Approved;
        let error = engine
            .evaluate_payment(&approved_memo, &actor("u-gmd", "gmd", "hq"))
            .expect_err("only finance may pay");
        assert!(matches!(error, WorkflowError::RoleNotRecognized { .. }));
    }

    #[test]
    fn payment_is_rejected_for_non_memo_kinds() {
        let engine = PolicyEngine::standard();
        let mut requisition = state(EntityKind::Requisition, "operations");
        requisition.overall_status = OverallStatus::Approved;

        let error = engine
            .evaluate_payment(&requisition, &actor("u-fin", "finance", "finance"))
            .expect_err("requisitions have no payment phase");
        assert_eq!(error, WorkflowError::PaymentNotSupported { kind: EntityKind::Requisition });
    }

    #[test]
    fn next_approver_walks_the_chain_in_order() {
        let engine = PolicyEngine::standard();
        let requisition = state(EntityKind::Requisition, "operations");
        assert_eq!(engine.next_approver(&requisition), Some(ChainRole::Manager));

        let mut in_review =
            with_approvals(state(EntityKind::Requisition, "operations"), &[ChainRole::Manager]);
        in_review.overall_status = OverallStatus::InReview;
        assert_eq!(engine.next_approver(&in_review), Some(ChainRole::Executive));

        let finance_created = state(EntityKind::Requisition, "finance");
        assert_eq!(engine.next_approver(&finance_created), Some(ChainRole::Finance));

        let mut rejected = state(EntityKind::Requisition, "operations");
        rejected.overall_status = OverallStatus::Rejected;
        assert_eq!(engine.next_approver(&rejected), None);
    }

    #[test]
    fn next_approver_is_finance_first_but_gmd_waits_for_it() {
        // Non-finance creator: finance has no dependency of its own, so both
        // finance and the manager branch are actionable; the chain reports
        // the earliest undecided step.
        let engine = PolicyEngine::standard();
        let mut memo = with_approvals(
            state(EntityKind::Memo, "operations"),
            &[ChainRole::Manager, ChainRole::Executive, ChainRole::Finance],
        );
        memo.overall_status = OverallStatus::InReview;
        assert_eq!(engine.next_approver(&memo), Some(ChainRole::Gmd));
    }
}
