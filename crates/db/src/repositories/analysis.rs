use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use liftlab_core::domain::analysis::{AnalysisSnapshot, NewSnapshot, SnapshotId, StatisticsUpdate};
use liftlab_core::domain::experiment::ExperimentId;
use liftlab_core::domain::goal::GoalId;
use liftlab_core::domain::variant::VariantId;
use liftlab_core::engine::SnapshotStore;
use liftlab_core::errors::StoreError;

use super::RepositoryError;
use crate::DbPool;

/// SQLite-backed analysis time series.
///
/// Inserts rely on the unique (experiment, variant, goal, calculated_when)
/// key with ON CONFLICT DO NOTHING, and statistic fills are guarded on the
/// columns still being NULL, so both writers are safe to re-run.
pub struct SqlSnapshotStore {
    pool: DbPool,
}

impl SqlSnapshotStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn snapshot_from_row(row: &SqliteRow) -> Result<AnalysisSnapshot, RepositoryError> {
        Ok(AnalysisSnapshot {
            id: SnapshotId(row.try_get::<i64, _>("id")?),
            experiment_id: ExperimentId(row.try_get::<i64, _>("experiment_id")?),
            variant_id: VariantId(row.try_get::<i64, _>("variant_id")?),
            goal_id: GoalId(row.try_get::<i64, _>("goal_id")?),
            calculated_when: row.try_get::<DateTime<Utc>, _>("calculated_when")?,
            days_analyzed: row.try_get::<i64, _>("days_analyzed")?,
            total_users: row.try_get::<i64, _>("total_users")?,
            total_conversions: row.try_get::<i64, _>("total_conversions")?,
            conversion_rate: row.try_get::<f64, _>("conversion_rate")?,
            post_alpha: row.try_get::<f64, _>("post_alpha")?,
            post_beta: row.try_get::<f64, _>("post_beta")?,
            probability_of_being_best: row
                .try_get::<Option<f64>, _>("probability_of_being_best")?,
            expected_loss: row.try_get::<Option<f64>, _>("expected_loss")?,
        })
    }

    /// The full time series for one (experiment, goal) pair, oldest first,
    /// filled and pending rows alike.
    pub async fn series(
        &self,
        experiment_id: ExperimentId,
        goal_id: GoalId,
    ) -> Result<Vec<AnalysisSnapshot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, experiment_id, variant_id, goal_id, calculated_when, days_analyzed, \
                    total_users, total_conversions, conversion_rate, post_alpha, post_beta, \
                    probability_of_being_best, expected_loss \
             FROM analysis WHERE experiment_id = ? AND goal_id = ? \
             ORDER BY calculated_when, id",
        )
        .bind(experiment_id.0)
        .bind(goal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::snapshot_from_row).collect()
    }
}

#[async_trait]
impl SnapshotStore for SqlSnapshotStore {
    async fn insert_pending(&self, rows: &[NewSnapshot]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(super::db_error)?;
        let mut created = 0;

        for row in rows {
            let result = sqlx::query(
                "INSERT INTO analysis (experiment_id, variant_id, goal_id, calculated_when, \
                        days_analyzed, total_users, total_conversions, conversion_rate, \
                        post_alpha, post_beta) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (experiment_id, variant_id, goal_id, calculated_when) DO NOTHING",
            )
            .bind(row.experiment_id.0)
            .bind(row.variant_id.0)
            .bind(row.goal_id.0)
            .bind(row.calculated_when)
            .bind(row.days_analyzed)
            .bind(row.total_users)
            .bind(row.total_conversions)
            .bind(row.conversion_rate)
            .bind(row.post_alpha)
            .bind(row.post_beta)
            .execute(&mut *tx)
            .await
            .map_err(super::db_error)?;

            created += result.rows_affected();
        }

        tx.commit().await.map_err(super::db_error)?;
        Ok(created)
    }

    async fn pending_rows(
        &self,
        experiment_id: ExperimentId,
        goal_id: GoalId,
    ) -> Result<Vec<AnalysisSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, experiment_id, variant_id, goal_id, calculated_when, days_analyzed, \
                    total_users, total_conversions, conversion_rate, post_alpha, post_beta, \
                    probability_of_being_best, expected_loss \
             FROM analysis \
             WHERE experiment_id = ? AND goal_id = ? \
               AND probability_of_being_best IS NULL AND expected_loss IS NULL \
             ORDER BY id",
        )
        .bind(experiment_id.0)
        .bind(goal_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(super::db_error)?;

        Ok(rows
            .iter()
            .map(Self::snapshot_from_row)
            .collect::<Result<Vec<_>, RepositoryError>>()?)
    }

    async fn row_count(
        &self,
        experiment_id: ExperimentId,
        goal_id: GoalId,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM analysis WHERE experiment_id = ? AND goal_id = ?",
        )
        .bind(experiment_id.0)
        .bind(goal_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(super::db_error)?;

        Ok(count as u64)
    }

    async fn goal_ids_with_rows(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<GoalId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT goal_id FROM analysis WHERE experiment_id = ? ORDER BY goal_id",
        )
        .bind(experiment_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(super::db_error)?;

        Ok(ids.into_iter().map(GoalId).collect())
    }

    async fn experiment_ids_with_rows(&self) -> Result<Vec<ExperimentId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT experiment_id FROM analysis ORDER BY experiment_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(super::db_error)?;

        Ok(ids.into_iter().map(ExperimentId).collect())
    }

    async fn fill_statistics(&self, updates: &[StatisticsUpdate]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(super::db_error)?;
        let mut updated = 0;

        for update in updates {
            let result = sqlx::query(
                "UPDATE analysis \
                 SET probability_of_being_best = ?, expected_loss = ? \
                 WHERE id = ? \
                   AND probability_of_being_best IS NULL AND expected_loss IS NULL",
            )
            .bind(update.probability_of_being_best)
            .bind(update.expected_loss)
            .bind(update.snapshot_id.0)
            .execute(&mut *tx)
            .await
            .map_err(super::db_error)?;

            updated += result.rows_affected();
        }

        tx.commit().await.map_err(super::db_error)?;
        Ok(updated)
    }
}
