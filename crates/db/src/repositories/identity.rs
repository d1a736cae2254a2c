use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use greenlight_core::domain::actor::ActorProfile;
use greenlight_core::domain::entity::Department;
use greenlight_core::workflow::{DirectoryError, IdentityDirectory};

use super::RepositoryError;
use crate::DbPool;

/// Staff directory backed by the `staff` table. The workflow engine only
/// reads it; writes exist for seeding and staff administration.
#[derive(Clone)]
pub struct SqlIdentityDirectory {
    pool: DbPool,
}

impl SqlIdentityDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_staff(&self, profile: &ActorProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO staff (id, display_name, role, department, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 role = excluded.role,
                 department = excluded.department",
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(&profile.role)
        .bind(profile.department.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn staff_count(&self) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM staff")
            .fetch_one(&self.pool)
            .await?;
        row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn find_actor(&self, actor_id: &str) -> Result<Option<ActorProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, display_name, role, department FROM staff WHERE id = ?",
        )
        .bind(actor_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
        Ok(Some(ActorProfile {
            id: row.try_get("id").map_err(decode)?,
            display_name: row.try_get("display_name").map_err(decode)?,
            role: row.try_get("role").map_err(decode)?,
            department: Department::new(row.try_get::<String, _>("department").map_err(decode)?),
        }))
    }
}

#[async_trait]
impl IdentityDirectory for SqlIdentityDirectory {
    async fn resolve_actor(&self, actor_id: &str) -> Result<Option<ActorProfile>, DirectoryError> {
        Ok(self.find_actor(actor_id).await?)
    }
}
