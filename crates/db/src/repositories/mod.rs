use thiserror::Error;

use liftlab_core::errors::{DomainError, StoreError};

pub mod analysis;
pub mod experiment;
pub mod facts;

pub use analysis::SqlSnapshotStore;
pub use experiment::SqlExperimentCatalog;
pub use facts::SqlFactSource;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("experiment {0} not found")]
    ExperimentNotFound(i64),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::new(error.to_string())
    }
}

pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    StoreError::new(error.to_string())
}
