use chrono::Utc;

use greenlight_core::domain::actor::ActorProfile;
use greenlight_core::domain::entity::{
    ApprovalState, Department, EntityId, EntityKind, FlagMap, OverallStatus,
};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlApprovalStore, SqlIdentityDirectory};

struct SeedStaffContract {
    id: &'static str,
    display_name: &'static str,
    role: &'static str,
    department: &'static str,
}

struct SeedEntityContract {
    id: &'static str,
    kind: EntityKind,
    title: &'static str,
    amount: Option<&'static str>,
    created_by: &'static str,
    description: &'static str,
}

/// Canonical staff roster: one holder per chain slot plus two creators,
/// one of them in finance so the short-chain path is exercisable.
const SEED_STAFF: &[SeedStaffContract] = &[
    SeedStaffContract {
        id: "staff-ops-01",
        display_name: "Bola Adeyemi",
        role: "officer",
        department: "operations",
    },
    SeedStaffContract {
        id: "staff-fin-01",
        display_name: "Ngozi Eze",
        role: "officer",
        department: "finance",
    },
    SeedStaffContract {
        id: "staff-ict-01",
        display_name: "Tunde Bakare",
        role: "officer",
        department: "ict",
    },
    SeedStaffContract {
        id: "mgr-01",
        display_name: "Ada Okafor",
        role: "manager",
        department: "operations",
    },
    SeedStaffContract {
        id: "exec-01",
        display_name: "Chidi Nwosu",
        role: "executive",
        department: "hq",
    },
    SeedStaffContract {
        id: "fin-01",
        display_name: "Amina Yusuf",
        role: "finance",
        department: "finance",
    },
    SeedStaffContract { id: "gmd-01", display_name: "Emeka Obi", role: "gmd", department: "hq" },
    SeedStaffContract {
        id: "chair-01",
        display_name: "Folake Adebayo",
        role: "chairman",
        department: "hq",
    },
];

const SEED_ENTITIES: &[SeedEntityContract] = &[
    SeedEntityContract {
        id: "MEMO-seed-001",
        kind: EntityKind::Memo,
        title: "Generator fuel replenishment",
        amount: Some("1850.00"),
        created_by: "staff-ops-01",
        description: "Operations memo awaiting the full chain",
    },
    SeedEntityContract {
        id: "REQ-seed-001",
        kind: EntityKind::Requisition,
        title: "Stationery restock Q3",
        amount: Some("420.75"),
        created_by: "staff-fin-01",
        description: "Finance-created requisition starting at the finance slot",
    },
    SeedEntityContract {
        id: "LV-seed-001",
        kind: EntityKind::LeaveRequest,
        title: "Annual leave 2026-09-14 to 2026-09-25",
        amount: None,
        created_by: "staff-ict-01",
        description: "Leave request on the short chain",
    },
];

#[derive(Debug)]
pub struct SeedResult {
    pub staff_seeded: usize,
    pub entities_seeded: Vec<EntitySeedInfo>,
}

#[derive(Debug)]
pub struct EntitySeedInfo {
    pub entity_id: &'static str,
    pub kind: EntityKind,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub checks: Vec<(String, bool)>,
}

impl VerificationResult {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|(_, passed)| *passed)
    }
}

/// Deterministic demo dataset: the staff roster plus one pending entity of
/// each kind. Loading is idempotent for staff and fails on re-seeded
/// entities, so `verify` is the re-run path.
pub struct SeedDataset;

impl SeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlIdentityDirectory::new(pool.clone());
        for staff in SEED_STAFF {
            directory
                .upsert_staff(&ActorProfile {
                    id: staff.id.to_string(),
                    display_name: staff.display_name.to_string(),
                    role: staff.role.to_string(),
                    department: Department::new(staff.department),
                })
                .await?;
        }

        let store = SqlApprovalStore::new(pool.clone());
        let now = Utc::now();
        for entity in SEED_ENTITIES {
            let creator_department = SEED_STAFF
                .iter()
                .find(|staff| staff.id == entity.created_by)
                .map(|staff| staff.department)
                .unwrap_or("operations");

            let amount = entity
                .amount
                .map(|raw| {
                    raw.parse().map_err(|e| {
                        RepositoryError::Decode(format!("bad seed amount `{raw}`: {e}"))
                    })
                })
                .transpose()?;

            store.insert_state(&ApprovalState {
                id: EntityId(entity.id.to_string()),
                kind: entity.kind,
                title: entity.title.to_string(),
                amount,
                created_by: entity.created_by.to_string(),
                creator_department: Department::new(creator_department),
                requires_approval: true,
                flags: FlagMap::new(),
                overall_status: OverallStatus::Pending,
                version: 1,
                created_at: now,
                updated_at: now,
            })
            .await?;
        }

        Ok(SeedResult {
            staff_seeded: SEED_STAFF.len(),
            entities_seeded: SEED_ENTITIES
                .iter()
                .map(|entity| EntitySeedInfo {
                    entity_id: entity.id,
                    kind: entity.kind,
                    description: entity.description,
                })
                .collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let staff_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM staff")
            .fetch_one(pool)
            .await?;
        checks.push(("staff roster".to_string(), staff_count >= SEED_STAFF.len() as i64));

        for entity in SEED_ENTITIES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM workflow_entity WHERE id = ?1 AND kind = ?2)",
            )
            .bind(entity.id)
            .bind(entity.kind.as_str())
            .fetch_one(pool)
            .await?;
            checks.push((format!("entity {}", entity.id), exists == 1));
        }

        Ok(VerificationResult { checks })
    }
}
