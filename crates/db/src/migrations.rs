use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of migrations recorded as applied in the target database.
/// Zero when the bookkeeping table does not exist yet.
pub async fn applied_count(pool: &DbPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Number of migrations embedded in this binary.
pub fn embedded_count() -> usize {
    MIGRATOR.iter().count()
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "project",
        "experiment",
        "experiment_status_history",
        "variant",
        "goal",
        "experiment_goal",
        "app_user",
        "allocation",
        "conversion",
        "analysis",
        "idx_experiment_project_id",
        "idx_experiment_status",
        "idx_experiment_status_history_experiment_id",
        "idx_variant_experiment_id",
        "idx_allocation_experiment_variant",
        "idx_conversion_experiment_goal",
        "idx_analysis_series",
        "idx_analysis_pending",
    ];

    #[tokio::test]
    async fn migrations_create_the_managed_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE name = ?",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| panic!("check schema object {object}"))
            .get::<i64, _>("count");

            assert_eq!(count, 1, "expected schema object `{object}` to exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
    }

    #[tokio::test]
    async fn analysis_unique_key_rejects_duplicate_snapshots() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query("INSERT INTO project (shop) VALUES ('demo.myshopify.com')")
            .execute(&pool)
            .await
            .expect("insert project");
        sqlx::query("INSERT INTO experiment (project_id, name, status) VALUES (1, 'x', 'active')")
            .execute(&pool)
            .await
            .expect("insert experiment");
        sqlx::query("INSERT INTO variant (experiment_id, name, is_control) VALUES (1, 'Control', 1)")
            .execute(&pool)
            .await
            .expect("insert variant");
        sqlx::query("INSERT INTO goal (name) VALUES ('Completed Checkout')")
            .execute(&pool)
            .await
            .expect("insert goal");

        let insert = "INSERT INTO analysis (experiment_id, variant_id, goal_id, calculated_when, \
                      days_analyzed, total_users, total_conversions, conversion_rate, post_alpha, \
                      post_beta) VALUES (1, 1, 1, '2026-08-23T00:00:00Z', 1, 100, 5, 0.05, 6.0, 96.0)";
        sqlx::query(insert).execute(&pool).await.expect("first insert");
        let duplicate = sqlx::query(insert).execute(&pool).await;
        assert!(duplicate.is_err(), "duplicate snapshot row should violate the unique key");
    }
}
