use thiserror::Error;

use greenlight_core::workflow::{DirectoryError, StoreError};

pub mod identity;
pub mod workflow;

pub use identity::SqlIdentityDirectory;
pub use workflow::SqlApprovalStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("concurrent update detected for `{entity_id}`")]
    Conflict { entity_id: String },
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict { entity_id } => StoreError::Conflict { entity_id },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<RepositoryError> for DirectoryError {
    fn from(error: RepositoryError) -> Self {
        DirectoryError::Backend(error.to_string())
    }
}
