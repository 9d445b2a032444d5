//! SQLite pool setup for the analysis workload: frequent aggregate reads,
//! plus short write bursts from snapshot inserts and statistic fills.

use std::time::Duration;

use liftlab_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Pool sized and timed per the `[database]` config section.
pub async fn connect_from_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // The analysis table references experiment/variant/goal rows;
                // enforcement has to be on for every connection.
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                // WAL lets report reads proceed while a snapshot or fill
                // transaction is writing.
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
