use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use liftlab_core::domain::experiment::{Experiment, ExperimentId, ExperimentStatus, ProjectId};
use liftlab_core::domain::goal::{Goal, GoalId};
use liftlab_core::domain::variant::{Variant, VariantId};
use liftlab_core::engine::ExperimentCatalog;
use liftlab_core::errors::StoreError;

use super::RepositoryError;
use crate::DbPool;

/// SQLite-backed experiment catalog.
///
/// Reads hydrate the full aggregate (variants and goals included) because
/// the analysis pipeline always needs both. Status writes go through the
/// domain transition rules and leave a history record.
pub struct SqlExperimentCatalog {
    pool: DbPool,
}

impl SqlExperimentCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<Experiment, RepositoryError> {
        let id = ExperimentId(row.try_get::<i64, _>("id")?);
        let status_raw: String = row.try_get("status")?;
        let status = ExperimentStatus::parse(&status_raw)?;

        let variants = sqlx::query(
            "SELECT id, experiment_id, name, is_control FROM variant \
             WHERE experiment_id = ? ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|variant_row| {
            Ok(Variant {
                id: VariantId(variant_row.try_get::<i64, _>("id")?),
                experiment_id: ExperimentId(variant_row.try_get::<i64, _>("experiment_id")?),
                name: variant_row.try_get("name")?,
                is_control: variant_row.try_get::<bool, _>("is_control")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let goals = sqlx::query(
            "SELECT g.id, g.name FROM goal g \
             JOIN experiment_goal eg ON eg.goal_id = g.id \
             WHERE eg.experiment_id = ? ORDER BY g.id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|goal_row| {
            Ok(Goal {
                id: GoalId(goal_row.try_get::<i64, _>("id")?),
                name: goal_row.try_get("name")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(Experiment {
            id,
            project_id: ProjectId(row.try_get::<i64, _>("project_id")?),
            name: row.try_get("name")?,
            status,
            start_date: row.try_get::<Option<DateTime<Utc>>, _>("start_date")?,
            end_date: row.try_get::<Option<DateTime<Utc>>, _>("end_date")?,
            variants,
            goals,
        })
    }

    async fn load(&self, id: ExperimentId) -> Result<Option<Experiment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, project_id, name, status, start_date, end_date \
             FROM experiment WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    /// Applies a lifecycle transition and records it in the status history.
    /// Invalid transitions are rejected before any write happens.
    pub async fn set_status(
        &self,
        id: ExperimentId,
        next: ExperimentStatus,
        changed_at: DateTime<Utc>,
    ) -> Result<Experiment, RepositoryError> {
        let mut experiment =
            self.load(id).await?.ok_or(RepositoryError::ExperimentNotFound(id.0))?;
        experiment.transition_to(next)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE experiment SET status = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO experiment_status_history (experiment_id, status, changed_at) \
             VALUES (?, ?, ?)",
        )
        .bind(id.0)
        .bind(next.as_str())
        .bind(changed_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(experiment)
    }

    pub async fn status_history(
        &self,
        id: ExperimentId,
    ) -> Result<Vec<(ExperimentStatus, DateTime<Utc>)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT status, changed_at FROM experiment_status_history \
             WHERE experiment_id = ? ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status = ExperimentStatus::parse(&row.try_get::<String, _>("status")?)?;
                let changed_at = row.try_get::<DateTime<Utc>, _>("changed_at")?;
                Ok((status, changed_at))
            })
            .collect()
    }
}

#[async_trait]
impl ExperimentCatalog for SqlExperimentCatalog {
    async fn active_experiments(&self) -> Result<Vec<Experiment>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, project_id, name, status, start_date, end_date \
             FROM experiment WHERE status = 'active' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(super::db_error)?;

        let mut experiments = Vec::with_capacity(rows.len());
        for row in &rows {
            experiments.push(self.hydrate(row).await?);
        }
        Ok(experiments)
    }

    async fn find_experiment(
        &self,
        id: ExperimentId,
    ) -> Result<Option<Experiment>, StoreError> {
        Ok(self.load(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use liftlab_core::domain::experiment::{ExperimentId, ExperimentStatus};
    use liftlab_core::engine::ExperimentCatalog;

    use crate::fixtures::seed_demo_dataset;
    use crate::migrations::run_pending;
    use crate::{connect_with_settings, repositories::RepositoryError, SqlExperimentCatalog};

    async fn seeded_catalog() -> (SqlExperimentCatalog, ExperimentId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        let seed = seed_demo_dataset(&pool).await.expect("seed");
        (SqlExperimentCatalog::new(pool), seed.experiment_id)
    }

    #[tokio::test]
    async fn active_experiments_hydrate_variants_and_goals() {
        let (catalog, experiment_id) = seeded_catalog().await;

        let experiments = catalog.active_experiments().await.expect("load");
        assert_eq!(experiments.len(), 1);

        let experiment = &experiments[0];
        assert_eq!(experiment.id, experiment_id);
        assert_eq!(experiment.variants.len(), 2);
        assert_eq!(experiment.goals.len(), 1);
        assert_eq!(experiment.control().map(|v| v.name.as_str()), Some("Control"));
    }

    #[tokio::test]
    async fn find_experiment_returns_none_for_unknown_id() {
        let (catalog, _) = seeded_catalog().await;
        let found = catalog.find_experiment(ExperimentId(404)).await.expect("query");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn set_status_records_history_and_excludes_paused_from_active() {
        let (catalog, experiment_id) = seeded_catalog().await;
        let now = Utc::now();

        catalog
            .set_status(experiment_id, ExperimentStatus::Paused, now)
            .await
            .expect("pause");

        let active = catalog.active_experiments().await.expect("load");
        assert!(active.is_empty());

        let history = catalog.status_history(experiment_id).await.expect("history");
        assert_eq!(history.last().map(|(status, _)| *status), Some(ExperimentStatus::Paused));

        catalog
            .set_status(experiment_id, ExperimentStatus::Active, now)
            .await
            .expect("resume");
        assert_eq!(catalog.active_experiments().await.expect("load").len(), 1);
    }

    #[tokio::test]
    async fn set_status_rejects_invalid_transitions() {
        let (catalog, experiment_id) = seeded_catalog().await;

        let error = catalog
            .set_status(experiment_id, ExperimentStatus::Draft, Utc::now())
            .await
            .expect_err("active -> draft should fail");
        assert!(matches!(error, RepositoryError::Domain(_)));

        // The rejected write must not leave a history record.
        let history = catalog.status_history(experiment_id).await.expect("history");
        assert!(history.is_empty());
    }
}
