use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ChainRole;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three approvable record kinds. Tags double as route segments and
/// storage discriminators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Memo,
    Requisition,
    LeaveRequest,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memo => "memo",
            Self::Requisition => "requisition",
            Self::LeaveRequest => "leave_request",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memo" | "memos" => Some(Self::Memo),
            "requisition" | "requisitions" => Some(Self::Requisition),
            "leave_request" | "leave_requests" | "leave-request" => Some(Self::LeaveRequest),
            _ => None,
        }
    }

    /// Memos carry a post-approval payment phase; the others terminate at
    /// approved/rejected.
    pub fn supports_payment(&self) -> bool {
        matches!(self, Self::Memo)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized department tag. `finance` and `ict` are meaningful to the
/// policy tables; anything else is carried verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Department(String);

impl Department {
    pub const FINANCE: &'static str = "finance";
    pub const ICT: &'static str = "ict";

    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, tag: &str) -> bool {
        self.0 == tag.trim().to_ascii_lowercase()
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-role decision slot. Decided variants carry the acting user and the
/// decision instant so the chain is auditable and re-decision attempts can
/// be refused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalFlag {
    Unset,
    Approved { actor_id: String, decided_at: DateTime<Utc> },
    Rejected { actor_id: String, decided_at: DateTime<Utc> },
}

impl ApprovalFlag {
    pub fn approved(actor_id: impl Into<String>, decided_at: DateTime<Utc>) -> Self {
        Self::Approved { actor_id: actor_id.into(), decided_at }
    }

    pub fn rejected(actor_id: impl Into<String>, decided_at: DateTime<Utc>) -> Self {
        Self::Rejected { actor_id: actor_id.into(), decided_at }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_decided(&self) -> bool {
        !self.is_unset()
    }
}

/// Role → flag mapping for one entity. Missing slots read as `Unset`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagMap(BTreeMap<ChainRole, ApprovalFlag>);

impl FlagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: ChainRole) -> &ApprovalFlag {
        self.0.get(&role).unwrap_or(&ApprovalFlag::Unset)
    }

    pub fn set(&mut self, role: ChainRole, flag: ApprovalFlag) {
        self.0.insert(role, flag);
    }

    pub fn with(mut self, role: ChainRole, flag: ApprovalFlag) -> Self {
        self.set(role, flag);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChainRole, &ApprovalFlag)> {
        self.0.iter().map(|(role, flag)| (*role, flag))
    }

    pub fn any_rejected(&self) -> bool {
        self.0.values().any(ApprovalFlag::is_rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
    Completed,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Whether approve/reject decisions are still admissible. `Approved` is
    /// terminal for the chain itself; only the memo payment transition may
    /// move past it.
    pub fn admits_decisions(&self) -> bool {
        matches!(self, Self::Pending | Self::InReview)
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted approval-chain view of one entity.
///
/// `creator_department` is snapshotted at creation; the chain shape for an
/// in-flight entity never changes when the creator transfers departments.
/// `version` backs the optimistic write check in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalState {
    pub id: EntityId,
    pub kind: EntityKind,
    pub title: String,
    pub amount: Option<Decimal>,
    pub created_by: String,
    pub creator_department: Department,
    pub requires_approval: bool,
    pub flags: FlagMap,
    pub overall_status: OverallStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
