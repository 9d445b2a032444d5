pub mod compute;
pub mod doctor;
pub mod migrate;
pub mod refresh;
pub mod report;
pub mod seed;
pub mod snapshot;

use std::sync::Arc;

use serde::Serialize;

use liftlab_core::config::{AppConfig, LoadOptions};
use liftlab_core::engine::AnalysisEngine;
use liftlab_db::{
    connect_from_config, DbPool, SqlExperimentCatalog, SqlFactSource, SqlSnapshotStore,
};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Shared failure shape for the connect/migrate/run pipeline inside each
/// command: (error_class, message, exit_code).
pub(crate) type StepFailure = (&'static str, String, u8);

pub(crate) async fn connect_pool(config: &AppConfig) -> Result<DbPool, StepFailure> {
    connect_from_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))
}

pub(crate) fn build_engine(pool: &DbPool, config: &AppConfig) -> AnalysisEngine {
    AnalysisEngine::new(
        Arc::new(SqlExperimentCatalog::new(pool.clone())),
        Arc::new(SqlFactSource::new(pool.clone())),
        Arc::new(SqlSnapshotStore::new(pool.clone())),
    )
    .with_refresh_draws(config.engine.refresh_draws)
}

pub(crate) fn load_config(command: &'static str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn build_runtime(command: &'static str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}
