use async_trait::async_trait;
use sqlx::Row;

use liftlab_core::aggregate::{AllocationCount, ConversionCount};
use liftlab_core::domain::experiment::ExperimentId;
use liftlab_core::domain::goal::GoalId;
use liftlab_core::domain::variant::VariantId;
use liftlab_core::engine::FactSource;
use liftlab_core::errors::StoreError;

use crate::DbPool;

/// Read-only aggregation over the raw allocation/conversion fact tables.
/// Counting happens in SQL; nothing here ever loads individual events.
pub struct SqlFactSource {
    pool: DbPool,
}

impl SqlFactSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FactSource for SqlFactSource {
    async fn allocation_counts(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<AllocationCount>, StoreError> {
        let rows = sqlx::query(
            "SELECT variant_id, COUNT(*) AS total_users FROM allocation \
             WHERE experiment_id = ? GROUP BY variant_id ORDER BY variant_id",
        )
        .bind(experiment_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(super::db_error)?;

        rows.iter()
            .map(|row| {
                Ok(AllocationCount {
                    variant_id: VariantId(
                        row.try_get::<i64, _>("variant_id").map_err(super::db_error)?,
                    ),
                    total_users: row.try_get::<i64, _>("total_users").map_err(super::db_error)?,
                })
            })
            .collect()
    }

    async fn conversion_counts(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<ConversionCount>, StoreError> {
        // Conversions are attributed to the variant the user was allocated
        // to; a conversion without an allocation row counts for nothing.
        let rows = sqlx::query(
            "SELECT a.variant_id AS variant_id, c.goal_id AS goal_id, \
                    COUNT(*) AS total_conversions \
             FROM conversion c \
             JOIN allocation a \
               ON a.user_id = c.user_id AND a.experiment_id = c.experiment_id \
             WHERE c.experiment_id = ? \
             GROUP BY a.variant_id, c.goal_id \
             ORDER BY a.variant_id, c.goal_id",
        )
        .bind(experiment_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(super::db_error)?;

        rows.iter()
            .map(|row| {
                Ok(ConversionCount {
                    variant_id: VariantId(
                        row.try_get::<i64, _>("variant_id").map_err(super::db_error)?,
                    ),
                    goal_id: GoalId(row.try_get::<i64, _>("goal_id").map_err(super::db_error)?),
                    total_conversions: row
                        .try_get::<i64, _>("total_conversions")
                        .map_err(super::db_error)?,
                })
            })
            .collect()
    }
}
