use liftlab_core::ExperimentId;

use crate::commands::{
    build_engine, build_runtime, connect_pool, load_config, CommandResult, StepFailure,
};

pub fn run(experiments: &[i64], draws: Option<u32>) -> CommandResult {
    let config = match load_config("refresh") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match build_runtime("refresh") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let draws = draws.unwrap_or(config.engine.refresh_draws);
    let experiment_ids: Vec<ExperimentId> =
        experiments.iter().copied().map(ExperimentId).collect();

    let result = runtime.block_on(async {
        let pool = connect_pool(&config).await?;
        // --draws applies to the full walk too, not just explicit subsets.
        let engine = build_engine(&pool, &config).with_refresh_draws(draws);

        let outcome = if experiment_ids.is_empty() {
            engine
                .refresh_all()
                .await
                .map_err(|error| ("refresh", error.to_string(), 6u8))?
        } else {
            engine.refresh_statistics(&experiment_ids, draws).await
        };

        pool.close().await;
        Ok::<_, StepFailure>(outcome)
    });

    match result {
        Ok(outcome) => {
            let message = format!(
                "run {}: {} pairs, {} updated, {} failed",
                outcome.run_id,
                outcome.outcomes.len(),
                outcome.updated_pairs(),
                outcome.failed_pairs()
            );
            let data = serde_json::to_value(&outcome).ok();
            if outcome.failed_pairs() == 0 {
                CommandResult::success_with_data("refresh", message, data)
            } else {
                CommandResult::failure("refresh", "partial_failure", message, 7)
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("refresh", error_class, message, exit_code)
        }
    }
}
