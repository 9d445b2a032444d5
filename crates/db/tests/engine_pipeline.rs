//! End-to-end pipeline over a real (in-memory) database: seed facts,
//! snapshot, estimate, and check the persisted statistics.

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;

use liftlab_core::engine::{AnalysisEngine, ComputeOutcome, PairResult, SkipReason};
use liftlab_core::{ExperimentId, GoalId};
use liftlab_db::migrations::run_pending;
use liftlab_db::{
    connect_with_settings, seed_demo_dataset, SeedSummary, SqlExperimentCatalog, SqlFactSource,
    SqlSnapshotStore,
};

async fn seeded_engine() -> (AnalysisEngine, Arc<SqlSnapshotStore>, SeedSummary) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    run_pending(&pool).await.expect("run migrations");
    let seed = seed_demo_dataset(&pool).await.expect("seed");

    let snapshots = Arc::new(SqlSnapshotStore::new(pool.clone()));
    let engine = AnalysisEngine::new(
        Arc::new(SqlExperimentCatalog::new(pool.clone())),
        Arc::new(SqlFactSource::new(pool)),
        snapshots.clone(),
    );
    (engine, snapshots, seed)
}

#[tokio::test]
async fn snapshot_then_compute_fills_report_grade_statistics() {
    let (engine, snapshots, seed) = seeded_engine().await;

    let result = engine.create_snapshot(Utc::now()).await.expect("snapshot pass");
    assert_eq!(result.rows_created, 2);
    assert!(result.failures.is_empty());

    let mut rng = StdRng::seed_from_u64(23);
    let outcome = engine
        .compute_variant_stats_with_rng(seed.experiment_id, seed.goal_id, 20_000, &mut rng)
        .await
        .expect("compute");
    assert_eq!(outcome, ComputeOutcome::Updated { rows: 2 });

    let series = snapshots.series(seed.experiment_id, seed.goal_id).await.expect("series");
    assert_eq!(series.len(), 2);

    let treatment = series
        .iter()
        .find(|row| row.variant_id == seed.treatment_variant_id)
        .expect("treatment row");
    let control = series
        .iter()
        .find(|row| row.variant_id == seed.control_variant_id)
        .expect("control row");

    // 8% vs 5% over 1000 users each is a decisive margin at 20000 draws.
    assert!(treatment.probability_of_being_best.expect("filled") > 0.9);
    assert!(treatment.expected_loss.expect("filled") < 0.005);
    assert!(control.expected_loss.expect("filled") > treatment.expected_loss.expect("filled"));

    let sum = treatment.probability_of_being_best.expect("filled")
        + control.probability_of_being_best.expect("filled");
    assert!((sum - 1.0).abs() < 1e-9);

    assert_eq!(treatment.total_users, 1_000);
    assert_eq!(treatment.total_conversions, 80);
    assert_eq!(treatment.post_alpha, 81.0);
    assert_eq!(treatment.post_beta, 921.0);
    assert_eq!(treatment.days_analyzed, 14);
}

#[tokio::test]
async fn reruns_are_idempotent_end_to_end() {
    let (engine, snapshots, seed) = seeded_engine().await;
    let now = Utc::now();

    assert_eq!(engine.create_snapshot(now).await.expect("first pass").rows_created, 2);
    assert_eq!(engine.create_snapshot(now).await.expect("second pass").rows_created, 0);

    let first = engine
        .compute_variant_stats(seed.experiment_id, seed.goal_id, 2_000)
        .await
        .expect("first compute");
    assert_eq!(first, ComputeOutcome::Updated { rows: 2 });

    let second = engine
        .compute_variant_stats(seed.experiment_id, seed.goal_id, 2_000)
        .await
        .expect("second compute");
    assert_eq!(
        second,
        ComputeOutcome::Skipped { reason: SkipReason::PendingRowsBelowMinimum { pending: 0 } }
    );

    // Nothing was duplicated or re-filled.
    let series = snapshots.series(seed.experiment_id, seed.goal_id).await.expect("series");
    assert_eq!(series.len(), 2);
    assert!(series.iter().all(|row| !row.is_pending()));
}

#[tokio::test]
async fn refresh_all_walks_every_pair_with_rows() {
    let (engine, _snapshots, seed) = seeded_engine().await;
    engine.create_snapshot(Utc::now()).await.expect("snapshot pass");

    let result = engine.refresh_all().await.expect("refresh all");
    assert_eq!(result.outcomes.len(), 1);
    assert_eq!(result.updated_pairs(), 1);
    assert_eq!(result.failed_pairs(), 0);

    let pair = &result.outcomes[0];
    assert_eq!(pair.experiment_id, seed.experiment_id);
    assert_eq!(pair.goal_id, Some(seed.goal_id));
    assert!(matches!(pair.result, PairResult::Updated { rows: 2 }));
}

#[tokio::test]
async fn compute_against_unknown_pair_reports_no_rows() {
    let (engine, _snapshots, seed) = seeded_engine().await;
    engine.create_snapshot(Utc::now()).await.expect("snapshot pass");

    let outcome = engine
        .compute_variant_stats(seed.experiment_id, GoalId(99), 1_000)
        .await
        .expect("compute");
    assert_eq!(outcome, ComputeOutcome::Skipped { reason: SkipReason::NoSnapshotRows });

    let missing = engine.compute_variant_stats(ExperimentId(99), seed.goal_id, 1_000).await;
    assert!(missing.is_err());
}
