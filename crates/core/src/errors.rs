use thiserror::Error;

use crate::domain::experiment::{ExperimentId, ExperimentStatus};
use crate::domain::goal::GoalId;
use crate::domain::variant::VariantId;
use crate::monte_carlo::SimulationError;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("invalid experiment transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: ExperimentStatus, to: ExperimentStatus },
    #[error("unknown experiment status `{0}`")]
    UnknownStatus(String),
    #[error(
        "corrupt counts for experiment {experiment_id:?} variant {variant_id:?} goal {goal_id:?}: \
         {total_conversions} conversions over {total_users} users"
    )]
    CorruptCounts {
        experiment_id: ExperimentId,
        variant_id: VariantId,
        goal_id: GoalId,
        total_users: i64,
        total_conversions: i64,
    },
}

/// Failure surfaced by a snapshot/fact/catalog store implementation.
///
/// Core stays persistence-agnostic; the db crate maps its driver errors
/// into this type.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("store failure: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Per-unit-of-work analysis failure. One pair failing never aborts its
/// siblings; the orchestrator catches these, logs them, and moves on.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("experiment {0} not found")]
    ExperimentNotFound(ExperimentId),
    #[error("experiment {0} has no variants")]
    NoVariants(ExperimentId),
    #[error("experiment {0} has no goals")]
    NoGoals(ExperimentId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_wraps_into_analysis_error() {
        let error = AnalysisError::from(StoreError::new("database lock timeout"));
        assert_eq!(error.to_string(), "store failure: database lock timeout");
    }

    #[test]
    fn unknown_status_message_names_the_value() {
        let error = DomainError::UnknownStatus("running".to_string());
        assert_eq!(error.to_string(), "unknown experiment status `running`");
    }
}
