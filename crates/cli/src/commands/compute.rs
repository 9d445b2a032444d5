use rand::rngs::StdRng;
use rand::SeedableRng;

use liftlab_core::engine::ComputeOutcome;
use liftlab_core::{ExperimentId, GoalId};

use crate::commands::{
    build_engine, build_runtime, connect_pool, load_config, CommandResult, StepFailure,
};

pub fn run(experiment: i64, goal: i64, draws: Option<u32>, seed: Option<u64>) -> CommandResult {
    let config = match load_config("compute") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match build_runtime("compute") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let draws = draws.unwrap_or(config.engine.default_draws);
    let experiment_id = ExperimentId(experiment);
    let goal_id = GoalId(goal);

    let result = runtime.block_on(async {
        let pool = connect_pool(&config).await?;
        let engine = build_engine(&pool, &config);

        let outcome = match seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                engine
                    .compute_variant_stats_with_rng(experiment_id, goal_id, draws, &mut rng)
                    .await
            }
            None => engine.compute_variant_stats(experiment_id, goal_id, draws).await,
        }
        .map_err(|error| ("compute", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<_, StepFailure>(outcome)
    });

    match result {
        Ok(outcome) => {
            let message = match &outcome {
                ComputeOutcome::Updated { rows } => {
                    format!("filled statistics on {rows} rows with {draws} draws")
                }
                ComputeOutcome::Skipped { reason } => format!("skipped: {reason}"),
            };
            CommandResult::success_with_data("compute", message, serde_json::to_value(&outcome).ok())
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("compute", error_class, message, exit_code)
        }
    }
}
