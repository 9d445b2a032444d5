pub mod aggregate;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod monte_carlo;
pub mod posterior;

pub use aggregate::{summarize, AllocationCount, ConversionCount};
pub use config::{
    AppConfig, ConfigError, ConfigOverrides, DatabaseConfig, EngineConfig, LoadOptions, LogFormat,
    LoggingConfig,
};
pub use domain::analysis::{
    AnalysisSnapshot, NewSnapshot, SnapshotId, StatisticsUpdate, SummaryCount,
};
pub use domain::experiment::{Experiment, ExperimentId, ExperimentStatus, Project, ProjectId};
pub use domain::goal::{Goal, GoalId};
pub use domain::variant::{Variant, VariantId};
pub use engine::{
    AnalysisEngine, ComputeOutcome, ExperimentCatalog, ExperimentFailure, FactSource, PairOutcome,
    PairResult, RefreshResult, SkipReason, SnapshotResult, SnapshotStore,
};
pub use errors::{AnalysisError, DomainError, StoreError};
pub use monte_carlo::{
    estimate, finalize, simulate, SimulationError, VariantEstimate, VariantOutcome, DEFAULT_DRAWS,
    REFRESH_DRAWS,
};
pub use posterior::{Posterior, PosteriorError};
