//! Deterministic demo dataset for tests and the `seed` CLI command.

use chrono::{Duration, Utc};

use liftlab_core::domain::experiment::{ExperimentId, ProjectId};
use liftlab_core::domain::goal::GoalId;
use liftlab_core::domain::variant::VariantId;

use crate::repositories::RepositoryError;
use crate::DbPool;

/// Identifiers of the seeded rows, for tests and command output.
#[derive(Clone, Copy, Debug)]
pub struct SeedSummary {
    pub project_id: ProjectId,
    pub experiment_id: ExperimentId,
    pub control_variant_id: VariantId,
    pub treatment_variant_id: VariantId,
    pub goal_id: GoalId,
    pub users: i64,
    pub allocations: i64,
    pub conversions: i64,
}

const USERS_PER_VARIANT: i64 = 1_000;
const CONTROL_CONVERSIONS: i64 = 50;
const TREATMENT_CONVERSIONS: i64 = 80;

/// Seeds one active two-variant experiment: Control converts at 5%,
/// Variant A at 8%, over 1000 allocated users each. Counts are exact, not
/// sampled, so tests can assert on them.
pub async fn seed_demo_dataset(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    let started = Utc::now() - Duration::days(14);
    let mut tx = pool.begin().await?;

    let project_id = sqlx::query("INSERT INTO project (shop) VALUES (?)")
        .bind("demo.myshopify.com")
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let experiment_id = sqlx::query(
        "INSERT INTO experiment (project_id, name, status, start_date) VALUES (?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind("Hero banner test")
    .bind("active")
    .bind(started)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let control_variant_id =
        sqlx::query("INSERT INTO variant (experiment_id, name, is_control) VALUES (?, ?, 1)")
            .bind(experiment_id)
            .bind("Control")
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

    let treatment_variant_id =
        sqlx::query("INSERT INTO variant (experiment_id, name, is_control) VALUES (?, ?, 0)")
            .bind(experiment_id)
            .bind("Variant A")
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

    let goal_id = sqlx::query("INSERT INTO goal (name) VALUES (?)")
        .bind("Completed Checkout")
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    sqlx::query("INSERT INTO experiment_goal (experiment_id, goal_id) VALUES (?, ?)")
        .bind(experiment_id)
        .bind(goal_id)
        .execute(&mut *tx)
        .await?;

    let mut users = 0;
    let mut allocations = 0;
    let mut conversions = 0;

    for (variant_id, converting) in [
        (control_variant_id, CONTROL_CONVERSIONS),
        (treatment_variant_id, TREATMENT_CONVERSIONS),
    ] {
        for index in 0..USERS_PER_VARIANT {
            let user_id = sqlx::query("INSERT INTO app_user (external_id) VALUES (?)")
                .bind(format!("user-{variant_id}-{index:04}"))
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
            users += 1;

            sqlx::query(
                "INSERT INTO allocation (user_id, experiment_id, variant_id, allocated_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(experiment_id)
            .bind(variant_id)
            .bind(started)
            .execute(&mut *tx)
            .await?;
            allocations += 1;

            // The first N users of each variant convert, the rest do not.
            if index < converting {
                sqlx::query(
                    "INSERT INTO conversion (user_id, experiment_id, goal_id, converted_at) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(experiment_id)
                .bind(goal_id)
                .bind(started + Duration::hours(index))
                .execute(&mut *tx)
                .await?;
                conversions += 1;
            }
        }
    }

    tx.commit().await?;

    Ok(SeedSummary {
        project_id: ProjectId(project_id),
        experiment_id: ExperimentId(experiment_id),
        control_variant_id: VariantId(control_variant_id),
        treatment_variant_id: VariantId(treatment_variant_id),
        goal_id: GoalId(goal_id),
        users,
        allocations,
        conversions,
    })
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::seed_demo_dataset;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    #[tokio::test]
    async fn seed_produces_the_documented_counts() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let seed = seed_demo_dataset(&pool).await.expect("seed");
        assert_eq!(seed.users, 2_000);
        assert_eq!(seed.allocations, 2_000);
        assert_eq!(seed.conversions, 130);

        let conversion_count = sqlx::query("SELECT COUNT(*) AS count FROM conversion")
            .fetch_one(&pool)
            .await
            .expect("count conversions")
            .get::<i64, _>("count");
        assert_eq!(conversion_count, 130);
    }
}
