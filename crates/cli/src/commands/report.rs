use liftlab_core::{ExperimentId, GoalId};
use liftlab_db::SqlSnapshotStore;

use crate::commands::{build_runtime, connect_pool, load_config, CommandResult, StepFailure};

pub fn run(experiment: i64, goal: i64) -> CommandResult {
    let config = match load_config("report") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match build_runtime("report") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_pool(&config).await?;
        let store = SqlSnapshotStore::new(pool.clone());
        let series = store
            .series(ExperimentId(experiment), GoalId(goal))
            .await
            .map_err(|error| ("report", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, StepFailure>(series)
    });

    match result {
        Ok(series) => {
            let pending = series.iter().filter(|row| row.is_pending()).count();
            let message = format!(
                "{} snapshot rows for experiment {experiment} goal {goal} ({pending} pending)",
                series.len()
            );
            CommandResult::success_with_data("report", message, serde_json::to_value(&series).ok())
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("report", error_class, message, exit_code)
        }
    }
}
