use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::experiment::ExperimentId;
use crate::domain::goal::GoalId;
use crate::domain::variant::VariantId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub i64);

/// Aggregated counts for one (experiment, variant, goal) slice at a point
/// in time. Ephemeral: produced by the aggregator, consumed by the
/// posterior builder, never persisted as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCount {
    pub experiment_id: ExperimentId,
    pub variant_id: VariantId,
    pub goal_id: GoalId,
    pub total_users: i64,
    pub total_conversions: i64,
}

impl SummaryCount {
    /// `0 <= conversions <= users` must hold; anything else means the fact
    /// tables are corrupt and the slice is unusable.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.total_users < 0
            || self.total_conversions < 0
            || self.total_conversions > self.total_users
        {
            return Err(DomainError::CorruptCounts {
                experiment_id: self.experiment_id,
                variant_id: self.variant_id,
                goal_id: self.goal_id,
                total_users: self.total_users,
                total_conversions: self.total_conversions,
            });
        }
        Ok(())
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.total_users == 0 {
            return 0.0;
        }
        self.total_conversions as f64 / self.total_users as f64
    }
}

/// One persisted row of the append-only analysis time series.
///
/// Rows are created pending (both statistics NULL) by the snapshot step and
/// later filled in place by the estimator. A filled row is final.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub id: SnapshotId,
    pub experiment_id: ExperimentId,
    pub variant_id: VariantId,
    pub goal_id: GoalId,
    pub calculated_when: DateTime<Utc>,
    pub days_analyzed: i64,
    pub total_users: i64,
    pub total_conversions: i64,
    pub conversion_rate: f64,
    pub post_alpha: f64,
    pub post_beta: f64,
    pub probability_of_being_best: Option<f64>,
    pub expected_loss: Option<f64>,
}

impl AnalysisSnapshot {
    pub fn is_pending(&self) -> bool {
        self.probability_of_being_best.is_none() && self.expected_loss.is_none()
    }
}

/// Write-side record for a fresh pending snapshot row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub experiment_id: ExperimentId,
    pub variant_id: VariantId,
    pub goal_id: GoalId,
    pub calculated_when: DateTime<Utc>,
    pub days_analyzed: i64,
    pub total_users: i64,
    pub total_conversions: i64,
    pub conversion_rate: f64,
    pub post_alpha: f64,
    pub post_beta: f64,
}

/// Statistics fill for an existing pending row, matched by row identity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatisticsUpdate {
    pub snapshot_id: SnapshotId,
    pub probability_of_being_best: f64,
    pub expected_loss: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(users: i64, conversions: i64) -> SummaryCount {
        SummaryCount {
            experiment_id: ExperimentId(1),
            variant_id: VariantId(1),
            goal_id: GoalId(1),
            total_users: users,
            total_conversions: conversions,
        }
    }

    #[test]
    fn accepts_counts_within_range() {
        assert!(summary(100, 0).validate().is_ok());
        assert!(summary(100, 100).validate().is_ok());
    }

    #[test]
    fn rejects_conversions_exceeding_users() {
        assert!(summary(10, 11).validate().is_err());
        assert!(summary(-1, 0).validate().is_err());
        assert!(summary(10, -1).validate().is_err());
    }

    #[test]
    fn conversion_rate_handles_zero_users() {
        assert_eq!(summary(0, 0).conversion_rate(), 0.0);
        assert!((summary(1000, 50).conversion_rate() - 0.05).abs() < 1e-12);
    }
}
