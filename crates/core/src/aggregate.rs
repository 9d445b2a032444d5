//! Turns grouped allocation/conversion facts into per-slice summary counts.

use serde::{Deserialize, Serialize};

use crate::domain::analysis::SummaryCount;
use crate::domain::experiment::Experiment;
use crate::domain::goal::GoalId;
use crate::domain::variant::VariantId;

/// Allocated-user count for one variant, as grouped by the fact source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCount {
    pub variant_id: VariantId,
    pub total_users: i64,
}

/// Converted-user count for one (variant, goal) slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionCount {
    pub variant_id: VariantId,
    pub goal_id: GoalId,
    pub total_conversions: i64,
}

/// One `SummaryCount` per (variant, goal) combination with at least one
/// allocated user. Variants without allocations contribute nothing; a goal
/// with no conversions for an allocated variant still gets a zero-count
/// entry so the posterior reflects the failures.
pub fn summarize(
    experiment: &Experiment,
    allocations: &[AllocationCount],
    conversions: &[ConversionCount],
) -> Vec<SummaryCount> {
    let mut summaries = Vec::with_capacity(experiment.variants.len() * experiment.goals.len());

    for variant in &experiment.variants {
        let total_users = allocations
            .iter()
            .find(|count| count.variant_id == variant.id)
            .map(|count| count.total_users)
            .unwrap_or(0);
        if total_users == 0 {
            continue;
        }

        for goal in &experiment.goals {
            let total_conversions = conversions
                .iter()
                .find(|count| count.variant_id == variant.id && count.goal_id == goal.id)
                .map(|count| count.total_conversions)
                .unwrap_or(0);

            summaries.push(SummaryCount {
                experiment_id: experiment.id,
                variant_id: variant.id,
                goal_id: goal.id,
                total_users,
                total_conversions,
            });
        }
    }

    summaries
}

#[cfg(test)]
mod tests {
    use crate::domain::experiment::{Experiment, ExperimentId, ExperimentStatus, ProjectId};
    use crate::domain::goal::{Goal, GoalId};
    use crate::domain::variant::{Variant, VariantId};

    use super::{summarize, AllocationCount, ConversionCount};

    fn experiment() -> Experiment {
        Experiment {
            id: ExperimentId(1),
            project_id: ProjectId(1),
            name: "Hero banner test".to_string(),
            status: ExperimentStatus::Active,
            start_date: None,
            end_date: None,
            variants: vec![
                Variant {
                    id: VariantId(10),
                    experiment_id: ExperimentId(1),
                    name: "Control".to_string(),
                    is_control: true,
                },
                Variant {
                    id: VariantId(11),
                    experiment_id: ExperimentId(1),
                    name: "Variant A".to_string(),
                    is_control: false,
                },
            ],
            goals: vec![
                Goal { id: GoalId(1), name: "Completed Checkout".to_string() },
                Goal { id: GoalId(2), name: "Added Product To Cart".to_string() },
            ],
        }
    }

    #[test]
    fn produces_one_entry_per_variant_goal_pair_with_data() {
        let allocations = vec![
            AllocationCount { variant_id: VariantId(10), total_users: 1000 },
            AllocationCount { variant_id: VariantId(11), total_users: 990 },
        ];
        let conversions = vec![
            ConversionCount { variant_id: VariantId(10), goal_id: GoalId(1), total_conversions: 50 },
            ConversionCount { variant_id: VariantId(11), goal_id: GoalId(1), total_conversions: 80 },
        ];

        let summaries = summarize(&experiment(), &allocations, &conversions);

        // 2 variants x 2 goals; the cart goal gets zero-conversion entries.
        assert_eq!(summaries.len(), 4);
        let checkout_control = summaries
            .iter()
            .find(|s| s.variant_id == VariantId(10) && s.goal_id == GoalId(1))
            .expect("control checkout slice");
        assert_eq!(checkout_control.total_users, 1000);
        assert_eq!(checkout_control.total_conversions, 50);

        let cart_variant = summaries
            .iter()
            .find(|s| s.variant_id == VariantId(11) && s.goal_id == GoalId(2))
            .expect("variant cart slice");
        assert_eq!(cart_variant.total_conversions, 0);
        assert_eq!(cart_variant.total_users, 990);
    }

    #[test]
    fn drops_variants_without_allocated_users() {
        let allocations = vec![AllocationCount { variant_id: VariantId(10), total_users: 120 }];

        let summaries = summarize(&experiment(), &allocations, &[]);

        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.variant_id == VariantId(10)));
    }

    #[test]
    fn experiment_without_any_data_contributes_nothing() {
        let summaries = summarize(&experiment(), &[], &[]);
        assert!(summaries.is_empty());
    }
}
