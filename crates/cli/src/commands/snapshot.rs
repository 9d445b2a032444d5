use chrono::Utc;

use crate::commands::{
    build_engine, build_runtime, connect_pool, load_config, CommandResult, StepFailure,
};

pub fn run() -> CommandResult {
    let config = match load_config("snapshot") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match build_runtime("snapshot") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_pool(&config).await?;
        let engine = build_engine(&pool, &config);
        let outcome = engine
            .create_snapshot(Utc::now())
            .await
            .map_err(|error| ("snapshot", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, StepFailure>(outcome)
    });

    match result {
        Ok(outcome) => {
            let data = serde_json::to_value(&outcome).ok();
            let message = format!(
                "created {} pending rows across {} experiments ({} failed)",
                outcome.rows_created,
                outcome.experiments_processed,
                outcome.failures.len()
            );
            if outcome.failures.is_empty() {
                CommandResult::success_with_data("snapshot", message, data)
            } else {
                // Rows that could be created were; the operator still needs
                // to look at the failed experiments.
                CommandResult::failure("snapshot", "partial_failure", message, 7)
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("snapshot", error_class, message, exit_code)
        }
    }
}
