//! Statistics-refresh orchestration.
//!
//! The engine owns the snapshot pipeline: aggregate facts into pending
//! snapshot rows, then fill each (experiment, goal) pair's pending rows
//! with Monte Carlo statistics. It never decides experiment lifecycle;
//! callers (cron, CLI) hand it work.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{self, AllocationCount, ConversionCount};
use crate::domain::analysis::{AnalysisSnapshot, NewSnapshot, StatisticsUpdate};
use crate::domain::experiment::{Experiment, ExperimentId};
use crate::domain::goal::GoalId;
use crate::errors::{AnalysisError, StoreError};
use crate::monte_carlo::{self, REFRESH_DRAWS};
use crate::posterior::Posterior;

/// Read side of the experiment catalog: which experiments exist and which
/// are currently collecting data.
#[async_trait]
pub trait ExperimentCatalog: Send + Sync {
    async fn active_experiments(&self) -> Result<Vec<Experiment>, StoreError>;
    async fn find_experiment(&self, id: ExperimentId) -> Result<Option<Experiment>, StoreError>;
}

/// Grouped counts over the raw allocation/conversion fact tables.
/// Read-only; event ingestion lives with the collectors, not here.
#[async_trait]
pub trait FactSource: Send + Sync {
    async fn allocation_counts(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<AllocationCount>, StoreError>;

    async fn conversion_counts(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<ConversionCount>, StoreError>;
}

/// The append-only analysis store. Writers are the snapshot step (insert)
/// and the estimator (guarded in-place fill); nothing deletes.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Inserts pending rows, skipping any that collide on
    /// (experiment, variant, goal, calculated_when). Returns the number of
    /// rows actually created.
    async fn insert_pending(&self, rows: &[NewSnapshot]) -> Result<u64, StoreError>;

    /// Rows for the pair where both statistics are still unset, in
    /// ascending row-id order.
    async fn pending_rows(
        &self,
        experiment_id: ExperimentId,
        goal_id: GoalId,
    ) -> Result<Vec<AnalysisSnapshot>, StoreError>;

    async fn row_count(
        &self,
        experiment_id: ExperimentId,
        goal_id: GoalId,
    ) -> Result<u64, StoreError>;

    async fn goal_ids_with_rows(
        &self,
        experiment_id: ExperimentId,
    ) -> Result<Vec<GoalId>, StoreError>;

    async fn experiment_ids_with_rows(&self) -> Result<Vec<ExperimentId>, StoreError>;

    /// Fills statistics on rows matched by id, guarded so only still-pending
    /// rows are touched. Returns the number of rows updated.
    async fn fill_statistics(&self, updates: &[StatisticsUpdate]) -> Result<u64, StoreError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotResult {
    pub rows_created: u64,
    pub experiments_processed: usize,
    pub failures: Vec<ExperimentFailure>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentFailure {
    pub experiment_id: ExperimentId,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// No snapshot rows exist at all for the pair.
    NoSnapshotRows,
    /// Fewer than two rows are still pending; either statistics are already
    /// filled (idempotent re-run) or only one variant has data.
    PendingRowsBelowMinimum { pending: usize },
    /// Pending rows exist but fewer than two carry usable posteriors.
    ValidPosteriorsBelowMinimum { valid: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSnapshotRows => write!(f, "no snapshot rows found"),
            Self::PendingRowsBelowMinimum { pending } => {
                write!(f, "need at least two pending rows, got {pending}")
            }
            Self::ValidPosteriorsBelowMinimum { valid } => {
                write!(f, "need at least two variants with valid posteriors, got {valid}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComputeOutcome {
    Updated { rows: u64 },
    Skipped { reason: SkipReason },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshResult {
    pub run_id: Uuid,
    pub outcomes: Vec<PairOutcome>,
}

impl RefreshResult {
    pub fn updated_pairs(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.result, PairResult::Updated { .. }))
            .count()
    }

    pub fn failed_pairs(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.result, PairResult::Failed { .. }))
            .count()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairOutcome {
    pub experiment_id: ExperimentId,
    pub goal_id: Option<GoalId>,
    pub result: PairResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairResult {
    Updated { rows: u64 },
    Skipped { reason: SkipReason },
    Failed { error: String },
}

pub struct AnalysisEngine {
    catalog: Arc<dyn ExperimentCatalog>,
    facts: Arc<dyn FactSource>,
    snapshots: Arc<dyn SnapshotStore>,
    refresh_draws: u32,
}

impl AnalysisEngine {
    pub fn new(
        catalog: Arc<dyn ExperimentCatalog>,
        facts: Arc<dyn FactSource>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self { catalog, facts, snapshots, refresh_draws: REFRESH_DRAWS }
    }

    pub fn with_refresh_draws(mut self, draws: u32) -> Self {
        self.refresh_draws = draws;
        self
    }

    pub fn refresh_draws(&self) -> u32 {
        self.refresh_draws
    }

    /// Aggregates every active experiment into fresh pending snapshot rows.
    /// One experiment failing is recorded and does not block the rest.
    pub async fn create_snapshot(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SnapshotResult, AnalysisError> {
        let experiments = self.catalog.active_experiments().await?;

        let mut rows_created = 0;
        let mut failures = Vec::new();
        let experiments_processed = experiments.len();

        for experiment in &experiments {
            match self.snapshot_experiment(experiment, now).await {
                Ok(created) => {
                    tracing::debug!(
                        experiment_id = %experiment.id,
                        rows = created,
                        "snapshot rows created"
                    );
                    rows_created += created;
                }
                Err(error) => {
                    tracing::warn!(
                        experiment_id = %experiment.id,
                        error = %error,
                        "snapshot creation failed for experiment"
                    );
                    failures.push(ExperimentFailure {
                        experiment_id: experiment.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            rows_created,
            experiments = experiments_processed,
            failures = failures.len(),
            "snapshot pass finished"
        );

        Ok(SnapshotResult { rows_created, experiments_processed, failures })
    }

    async fn snapshot_experiment(
        &self,
        experiment: &Experiment,
        now: DateTime<Utc>,
    ) -> Result<u64, AnalysisError> {
        if experiment.variants.is_empty() {
            return Err(AnalysisError::NoVariants(experiment.id));
        }
        if experiment.goals.is_empty() {
            return Err(AnalysisError::NoGoals(experiment.id));
        }

        let allocations = self.facts.allocation_counts(experiment.id).await?;
        let conversions = self.facts.conversion_counts(experiment.id).await?;
        let summaries = aggregate::summarize(experiment, &allocations, &conversions);
        let days_analyzed = experiment.days_analyzed(now);

        let mut rows = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if let Err(error) = summary.validate() {
                tracing::warn!(
                    experiment_id = %experiment.id,
                    variant_id = %summary.variant_id,
                    goal_id = %summary.goal_id,
                    error = %error,
                    "skipping corrupt summary slice"
                );
                continue;
            }

            let posterior = match Posterior::from_counts(
                summary.total_conversions,
                summary.total_users,
            ) {
                Ok(posterior) => posterior,
                Err(error) => {
                    tracing::warn!(
                        experiment_id = %experiment.id,
                        variant_id = %summary.variant_id,
                        goal_id = %summary.goal_id,
                        error = %error,
                        "skipping slice with unusable counts"
                    );
                    continue;
                }
            };

            rows.push(NewSnapshot {
                experiment_id: summary.experiment_id,
                variant_id: summary.variant_id,
                goal_id: summary.goal_id,
                calculated_when: now,
                days_analyzed,
                total_users: summary.total_users,
                total_conversions: summary.total_conversions,
                conversion_rate: summary.conversion_rate(),
                post_alpha: posterior.alpha,
                post_beta: posterior.beta,
            });
        }

        if rows.is_empty() {
            return Ok(0);
        }

        Ok(self.snapshots.insert_pending(&rows).await?)
    }

    /// Single-pair estimator entry point. Only pending rows are eligible, so
    /// calling this twice without new data is a no-op the second time.
    pub async fn compute_variant_stats(
        &self,
        experiment_id: ExperimentId,
        goal_id: GoalId,
        draws: u32,
    ) -> Result<ComputeOutcome, AnalysisError> {
        let mut rng = StdRng::from_entropy();
        self.compute_variant_stats_with_rng(experiment_id, goal_id, draws, &mut rng).await
    }

    /// As [`compute_variant_stats`](Self::compute_variant_stats), with a
    /// caller-supplied RNG for reproducible runs.
    pub async fn compute_variant_stats_with_rng<R: Rng + Send>(
        &self,
        experiment_id: ExperimentId,
        goal_id: GoalId,
        draws: u32,
        rng: &mut R,
    ) -> Result<ComputeOutcome, AnalysisError> {
        let experiment = self
            .catalog
            .find_experiment(experiment_id)
            .await?
            .ok_or(AnalysisError::ExperimentNotFound(experiment_id))?;

        if self.snapshots.row_count(experiment.id, goal_id).await? == 0 {
            return Ok(ComputeOutcome::Skipped { reason: SkipReason::NoSnapshotRows });
        }

        let pending = self.snapshots.pending_rows(experiment.id, goal_id).await?;
        if pending.len() < 2 {
            return Ok(ComputeOutcome::Skipped {
                reason: SkipReason::PendingRowsBelowMinimum { pending: pending.len() },
            });
        }

        let mut rows = Vec::with_capacity(pending.len());
        let mut posteriors = Vec::with_capacity(pending.len());
        for row in &pending {
            match Posterior::from_parameters(row.post_alpha, row.post_beta) {
                Some(posterior) => {
                    rows.push(row);
                    posteriors.push(posterior);
                }
                None => {
                    tracing::warn!(
                        experiment_id = %experiment.id,
                        goal_id = %goal_id,
                        snapshot_id = row.id.0,
                        alpha = row.post_alpha,
                        beta = row.post_beta,
                        "filtering snapshot row with corrupt posterior"
                    );
                }
            }
        }

        if posteriors.len() < 2 {
            return Ok(ComputeOutcome::Skipped {
                reason: SkipReason::ValidPosteriorsBelowMinimum { valid: posteriors.len() },
            });
        }

        let estimates = monte_carlo::estimate(&posteriors, draws, rng)?;

        let updates: Vec<StatisticsUpdate> = rows
            .iter()
            .zip(&estimates)
            .map(|(row, estimate)| StatisticsUpdate {
                snapshot_id: row.id,
                probability_of_being_best: estimate.probability_of_being_best,
                expected_loss: estimate.expected_loss,
            })
            .collect();

        let updated = self.snapshots.fill_statistics(&updates).await?;
        Ok(ComputeOutcome::Updated { rows: updated })
    }

    /// Runs the estimator over every (experiment, goal) pair in the
    /// worklist. Pair failures are isolated: logged, reported, and the loop
    /// continues with the next pair.
    pub async fn refresh_statistics(
        &self,
        experiment_ids: &[ExperimentId],
        draws: u32,
    ) -> RefreshResult {
        let run_id = Uuid::new_v4();
        let mut outcomes = Vec::new();

        for &experiment_id in experiment_ids {
            let goal_ids = match self.snapshots.goal_ids_with_rows(experiment_id).await {
                Ok(goal_ids) => goal_ids,
                Err(error) => {
                    tracing::error!(
                        %run_id,
                        experiment_id = %experiment_id,
                        error = %error,
                        "failed to discover goals for experiment"
                    );
                    outcomes.push(PairOutcome {
                        experiment_id,
                        goal_id: None,
                        result: PairResult::Failed { error: error.to_string() },
                    });
                    continue;
                }
            };

            for goal_id in goal_ids {
                let result =
                    match self.compute_variant_stats(experiment_id, goal_id, draws).await {
                        Ok(ComputeOutcome::Updated { rows }) => PairResult::Updated { rows },
                        Ok(ComputeOutcome::Skipped { reason }) => {
                            tracing::debug!(
                                %run_id,
                                experiment_id = %experiment_id,
                                goal_id = %goal_id,
                                reason = %reason,
                                "pair skipped"
                            );
                            PairResult::Skipped { reason }
                        }
                        Err(error) => {
                            tracing::error!(
                                %run_id,
                                experiment_id = %experiment_id,
                                goal_id = %goal_id,
                                error = %error,
                                "pair analysis failed"
                            );
                            PairResult::Failed { error: error.to_string() }
                        }
                    };

                outcomes.push(PairOutcome { experiment_id, goal_id: Some(goal_id), result });
            }
        }

        let result = RefreshResult { run_id, outcomes };
        tracing::info!(
            %run_id,
            pairs = result.outcomes.len(),
            updated = result.updated_pairs(),
            failed = result.failed_pairs(),
            "refresh pass finished"
        );
        result
    }

    /// Batch refresh over every experiment that has snapshot rows, at the
    /// configured refresh draw count.
    pub async fn refresh_all(&self) -> Result<RefreshResult, AnalysisError> {
        let experiment_ids = self.snapshots.experiment_ids_with_rows().await?;
        Ok(self.refresh_statistics(&experiment_ids, self.refresh_draws).await)
    }
}
