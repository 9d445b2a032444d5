//! Monte Carlo comparison of variant posteriors.
//!
//! For each draw, one sample is taken from every variant's Beta posterior.
//! The variant with the maximum sampled value wins the draw; every variant
//! accumulates `max - own_sample` as loss. Ties on the maximum go to the
//! first variant in iteration order (callers pass rows in ascending
//! snapshot-row id order, so the tie-break is deterministic). Continuous
//! draws make exact ties measure-zero, but the rule is fixed rather than
//! inherited from float comparison quirks.

use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::posterior::Posterior;

/// Default draw count for ad-hoc single-pair computation.
pub const DEFAULT_DRAWS: u32 = 1_000;

/// Draw count used by the batch refresh loop. Higher for report-grade
/// accuracy; the cost is linear in draws.
pub const REFRESH_DRAWS: u32 = 20_000;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("need at least two variants with valid posteriors, got {got}")]
    InsufficientVariants { got: usize },
    #[error("draws must be greater than zero")]
    ZeroDraws,
    #[error("invalid posterior Beta({alpha}, {beta}): {reason}")]
    InvalidPosterior { alpha: f64, beta: f64, reason: String },
}

/// Raw accumulation for one variant across a range of draws. Partial
/// results from disjoint draw ranges combine by addition, so the whole
/// simulation is a reduction over draws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub won: u64,
    pub loss_sum: f64,
}

impl VariantOutcome {
    pub fn merge(&mut self, other: &VariantOutcome) {
        self.won += other.won;
        self.loss_sum += other.loss_sum;
    }
}

/// Final per-variant statistics, normalized by the draw count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantEstimate {
    pub probability_of_being_best: f64,
    pub expected_loss: f64,
}

/// Runs `draws` independent rounds over the given posteriors and returns
/// one raw outcome per variant, index-aligned with the input.
pub fn simulate<R: Rng + ?Sized>(
    posteriors: &[Posterior],
    draws: u32,
    rng: &mut R,
) -> Result<Vec<VariantOutcome>, SimulationError> {
    if posteriors.len() < 2 {
        return Err(SimulationError::InsufficientVariants { got: posteriors.len() });
    }
    if draws == 0 {
        return Err(SimulationError::ZeroDraws);
    }

    let samplers = posteriors
        .iter()
        .map(|posterior| {
            Beta::new(posterior.alpha, posterior.beta).map_err(|error| {
                SimulationError::InvalidPosterior {
                    alpha: posterior.alpha,
                    beta: posterior.beta,
                    reason: error.to_string(),
                }
            })
        })
        .collect::<Result<Vec<Beta<f64>>, SimulationError>>()?;

    let mut outcomes = vec![VariantOutcome::default(); samplers.len()];
    let mut samples = vec![0.0f64; samplers.len()];

    for _ in 0..draws {
        for (slot, sampler) in samples.iter_mut().zip(&samplers) {
            *slot = sampler.sample(rng);
        }

        // Strict `>` keeps the first variant on ties.
        let mut best_index = 0;
        let mut best_value = samples[0];
        for (index, value) in samples.iter().enumerate().skip(1) {
            if *value > best_value {
                best_value = *value;
                best_index = index;
            }
        }

        outcomes[best_index].won += 1;
        for (outcome, value) in outcomes.iter_mut().zip(&samples) {
            outcome.loss_sum += best_value - value;
        }
    }

    Ok(outcomes)
}

/// Simulates and normalizes: `probability_of_being_best = won / draws`,
/// `expected_loss = loss_sum / draws`.
pub fn estimate<R: Rng + ?Sized>(
    posteriors: &[Posterior],
    draws: u32,
    rng: &mut R,
) -> Result<Vec<VariantEstimate>, SimulationError> {
    let outcomes = simulate(posteriors, draws, rng)?;
    Ok(finalize(&outcomes, draws))
}

/// Normalizes raw outcomes (possibly merged from partial runs) by the total
/// draw count they cover.
pub fn finalize(outcomes: &[VariantOutcome], draws: u32) -> Vec<VariantEstimate> {
    outcomes
        .iter()
        .map(|outcome| VariantEstimate {
            probability_of_being_best: outcome.won as f64 / draws as f64,
            expected_loss: outcome.loss_sum / draws as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::posterior::Posterior;

    use super::{estimate, finalize, simulate, SimulationError, VariantOutcome};

    fn posterior(conversions: i64, users: i64) -> Posterior {
        Posterior::from_counts(conversions, users).expect("valid counts")
    }

    #[test]
    fn every_draw_has_exactly_one_winner() {
        let posteriors = vec![posterior(50, 1000), posterior(60, 1000), posterior(55, 1000)];
        let mut rng = StdRng::seed_from_u64(7);

        let outcomes = simulate(&posteriors, 5_000, &mut rng).expect("simulation");
        let total_wins: u64 = outcomes.iter().map(|o| o.won).sum();
        assert_eq!(total_wins, 5_000);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let posteriors = vec![posterior(50, 1000), posterior(80, 1000)];
        let mut rng = StdRng::seed_from_u64(11);

        let estimates = estimate(&posteriors, 10_000, &mut rng).expect("estimation");
        let sum: f64 = estimates.iter().map(|e| e.probability_of_being_best).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn expected_loss_is_never_negative() {
        let posteriors = vec![posterior(5, 100), posterior(8, 100), posterior(2, 100)];
        let mut rng = StdRng::seed_from_u64(3);

        let estimates = estimate(&posteriors, 2_000, &mut rng).expect("estimation");
        assert!(estimates.iter().all(|e| e.expected_loss >= 0.0));
    }

    #[test]
    fn clearly_better_variant_dominates() {
        // Control 5% vs Variant A 8% over 1000 users each.
        let posteriors = vec![posterior(50, 1000), posterior(80, 1000)];
        let mut rng = StdRng::seed_from_u64(42);

        let estimates = estimate(&posteriors, 20_000, &mut rng).expect("estimation");
        assert!(estimates[1].probability_of_being_best > 0.9);
        assert!(estimates[0].expected_loss > estimates[1].expected_loss);
        assert!(estimates[1].expected_loss < 0.005);
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let posteriors = vec![posterior(50, 1000), posterior(80, 1000)];

        let mut first_rng = StdRng::seed_from_u64(99);
        let mut second_rng = StdRng::seed_from_u64(99);
        let first = estimate(&posteriors, 1_000, &mut first_rng).expect("first run");
        let second = estimate(&posteriors, 1_000, &mut second_rng).expect("second run");

        assert_eq!(first, second);
    }

    #[test]
    fn rejects_fewer_than_two_variants() {
        let mut rng = StdRng::seed_from_u64(1);
        let error = simulate(&[posterior(50, 1000)], 100, &mut rng).expect_err("single variant");
        assert_eq!(error, SimulationError::InsufficientVariants { got: 1 });

        let error = simulate(&[], 100, &mut rng).expect_err("no variants");
        assert_eq!(error, SimulationError::InsufficientVariants { got: 0 });
    }

    #[test]
    fn rejects_zero_draws() {
        let posteriors = vec![posterior(50, 1000), posterior(80, 1000)];
        let mut rng = StdRng::seed_from_u64(1);
        let error = simulate(&posteriors, 0, &mut rng).expect_err("zero draws");
        assert_eq!(error, SimulationError::ZeroDraws);
    }

    #[test]
    fn split_runs_merge_into_a_valid_reduction() {
        let posteriors = vec![posterior(50, 1000), posterior(80, 1000)];

        let mut rng_a = StdRng::seed_from_u64(5);
        let mut rng_b = StdRng::seed_from_u64(6);
        let mut merged = simulate(&posteriors, 4_000, &mut rng_a).expect("first half");
        let second = simulate(&posteriors, 4_000, &mut rng_b).expect("second half");
        for (left, right) in merged.iter_mut().zip(&second) {
            left.merge(right);
        }

        let total_wins: u64 = merged.iter().map(|o| o.won).sum();
        assert_eq!(total_wins, 8_000);

        let estimates = finalize(&merged, 8_000);
        let sum: f64 = estimates.iter().map(|e| e.probability_of_being_best).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn overwhelming_winner_has_near_zero_loss() {
        let posteriors = vec![posterior(900, 1000), posterior(10, 1000)];
        let mut rng = StdRng::seed_from_u64(21);

        let estimates = estimate(&posteriors, 5_000, &mut rng).expect("estimation");
        assert!(estimates[0].probability_of_being_best > 0.999);
        assert!(estimates[0].expected_loss < 1e-6);
    }

    #[test]
    fn merge_adds_wins_and_losses() {
        let mut left = VariantOutcome { won: 3, loss_sum: 0.5 };
        left.merge(&VariantOutcome { won: 2, loss_sum: 0.25 });
        assert_eq!(left, VariantOutcome { won: 5, loss_sum: 0.75 });
    }
}
