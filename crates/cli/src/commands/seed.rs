use liftlab_db::{migrations, seed_demo_dataset};

use crate::commands::{build_runtime, connect_pool, load_config, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_pool(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let summary = seed_demo_dataset(&pool)
            .await
            .map_err(|error| ("seed", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, StepFailure>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success_with_data(
            "seed",
            format!(
                "seeded experiment {} with {} users and {} conversions",
                summary.experiment_id.0, summary.users, summary.conversions
            ),
            Some(serde_json::json!({
                "project_id": summary.project_id.0,
                "experiment_id": summary.experiment_id.0,
                "control_variant_id": summary.control_variant_id.0,
                "treatment_variant_id": summary.treatment_variant_id.0,
                "goal_id": summary.goal_id.0,
                "users": summary.users,
                "allocations": summary.allocations,
                "conversions": summary.conversions,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
