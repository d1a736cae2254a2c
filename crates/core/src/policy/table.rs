use serde::{Deserialize, Serialize};

use crate::domain::actor::ChainRole;
use crate::domain::entity::{Department, EntityKind};

/// Gate a chain step waits on before its own flag may be set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dependency {
    None,
    Role(ChainRole),
    /// Conditional gate: when the creator belongs to `department` the step
    /// waits on `then`, otherwise on `otherwise`.
    WhenCreatorDepartment {
        department: String,
        then: ChainRole,
        otherwise: Box<Dependency>,
    },
}

impl Dependency {
    /// Resolve to the concrete role this step waits on for a given creator
    /// department, if any.
    pub fn resolve(&self, creator_department: &Department) -> Option<ChainRole> {
        match self {
            Self::None => None,
            Self::Role(role) => Some(*role),
            Self::WhenCreatorDepartment { department, then, otherwise } => {
                if creator_department.is(department) {
                    Some(*then)
                } else {
                    otherwise.resolve(creator_department)
                }
            }
        }
    }
}

/// Whether a step is mandatory for a given entity instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Applicability {
    Always,
    /// The step is auto-satisfied when the creator belongs to the named
    /// department; acting on it anyway is refused.
    SkippedWhenCreatorDepartment { department: String },
}

impl Applicability {
    pub fn is_skipped(&self, creator_department: &Department) -> bool {
        match self {
            Self::Always => false,
            Self::SkippedWhenCreatorDepartment { department } => creator_department.is(department),
        }
    }
}

/// One role's slot in an entity kind's approval chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub slot: ChainRole,
    pub depends_on: Dependency,
    pub applicability: Applicability,
}

impl ChainStep {
    fn required(slot: ChainRole, depends_on: Dependency) -> Self {
        Self { slot, depends_on, applicability: Applicability::Always }
    }

    fn skipped_for(slot: ChainRole, depends_on: Dependency, department: &str) -> Self {
        Self {
            slot,
            depends_on,
            applicability: Applicability::SkippedWhenCreatorDepartment {
                department: department.to_string(),
            },
        }
    }
}

/// Ordered chain definition for one entity kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChain {
    pub kind: EntityKind,
    pub steps: Vec<ChainStep>,
}

impl EntityChain {
    pub fn step_for(&self, role: ChainRole) -> Option<&ChainStep> {
        self.steps.iter().find(|step| step.slot == role)
    }

    pub fn applicable_steps<'a>(
        &'a self,
        creator_department: &'a Department,
    ) -> impl Iterator<Item = &'a ChainStep> {
        self.steps.iter().filter(move |step| !step.applicability.is_skipped(creator_department))
    }
}

/// Declarative policy tables for every approvable kind, built once at
/// process start. The engine never hand-codes a role's branch; it only
/// interprets this data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    chains: Vec<EntityChain>,
}

impl PolicyTable {
    pub fn new(chains: Vec<EntityChain>) -> Self {
        Self { chains }
    }

    /// The production chain layout.
    ///
    /// Memos and requisitions run the full five-role chain. Finance-created
    /// entities skip the manager and executive stages; ICT-created ones gate
    /// finance behind the executive instead of letting it decide first.
    /// Leave requests run a short manager → executive → gmd chain with no
    /// department skipping.
    pub fn standard() -> Self {
        let full_chain = |kind: EntityKind| EntityChain {
            kind,
            steps: vec![
                ChainStep::skipped_for(ChainRole::Manager, Dependency::None, Department::FINANCE),
                ChainStep::skipped_for(
                    ChainRole::Executive,
                    Dependency::Role(ChainRole::Manager),
                    Department::FINANCE,
                ),
                ChainStep::required(
                    ChainRole::Finance,
                    Dependency::WhenCreatorDepartment {
                        department: Department::ICT.to_string(),
                        then: ChainRole::Executive,
                        otherwise: Box::new(Dependency::None),
                    },
                ),
                ChainStep::required(ChainRole::Gmd, Dependency::Role(ChainRole::Finance)),
                ChainStep::required(ChainRole::Chairman, Dependency::Role(ChainRole::Gmd)),
            ],
        };

        let leave_chain = EntityChain {
            kind: EntityKind::LeaveRequest,
            steps: vec![
                ChainStep::required(ChainRole::Manager, Dependency::None),
                ChainStep::required(ChainRole::Executive, Dependency::Role(ChainRole::Manager)),
                ChainStep::required(ChainRole::Gmd, Dependency::Role(ChainRole::Executive)),
            ],
        };

        Self::new(vec![
            full_chain(EntityKind::Memo),
            full_chain(EntityKind::Requisition),
            leave_chain,
        ])
    }

    pub fn chain(&self, kind: EntityKind) -> Option<&EntityChain> {
        self.chains.iter().find(|chain| chain.kind == kind)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}
