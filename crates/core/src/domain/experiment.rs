use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::goal::Goal;
use crate::domain::variant::Variant;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentId(pub i64);

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A merchant project (shop). Every experiment is scoped to one project;
/// the engine never assumes a single-tenant row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub shop: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub project_id: ProjectId,
    pub name: String,
    pub status: ExperimentStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub variants: Vec<Variant>,
    pub goals: Vec<Goal>,
}

impl Experiment {
    /// The designated baseline arm. Exactly one variant is expected to be
    /// the control; the first match wins if data violates that.
    pub fn control(&self) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.is_control)
    }

    /// Whole days of data collected so far, floored at one so day-zero
    /// experiments still produce a labeled snapshot.
    pub fn days_analyzed(&self, now: DateTime<Utc>) -> i64 {
        match self.start_date {
            Some(start) => (now - start).num_days().max(1),
            None => 1,
        }
    }

    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self.status, next),
            (Draft, Active)
                | (Active, Paused)
                | (Active, Completed)
                | (Active, Archived)
                | (Paused, Active)
                | (Paused, Archived)
                | (Completed, Archived)
        )
    }

    pub fn transition_to(&mut self, next: ExperimentStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::goal::{Goal, GoalId};
    use crate::domain::variant::{Variant, VariantId};

    use super::{Experiment, ExperimentId, ExperimentStatus, ProjectId};

    fn experiment(status: ExperimentStatus) -> Experiment {
        Experiment {
            id: ExperimentId(1),
            project_id: ProjectId(1),
            name: "Hero banner test".to_string(),
            status,
            start_date: Some(Utc::now() - Duration::days(7)),
            end_date: None,
            variants: vec![
                Variant {
                    id: VariantId(1),
                    experiment_id: ExperimentId(1),
                    name: "Control".to_string(),
                    is_control: true,
                },
                Variant {
                    id: VariantId(2),
                    experiment_id: ExperimentId(1),
                    name: "Variant A".to_string(),
                    is_control: false,
                },
            ],
            goals: vec![Goal { id: GoalId(1), name: "Completed Checkout".to_string() }],
        }
    }

    #[test]
    fn allows_pause_and_resume() {
        let mut exp = experiment(ExperimentStatus::Active);
        exp.transition_to(ExperimentStatus::Paused).expect("active -> paused");
        exp.transition_to(ExperimentStatus::Active).expect("paused -> active");
        assert_eq!(exp.status, ExperimentStatus::Active);
    }

    #[test]
    fn blocks_draft_to_archived() {
        let mut exp = experiment(ExperimentStatus::Draft);
        let error = exp
            .transition_to(ExperimentStatus::Archived)
            .expect_err("draft -> archived should fail");
        assert!(matches!(error, crate::errors::DomainError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn control_is_found_among_variants() {
        let exp = experiment(ExperimentStatus::Active);
        assert_eq!(exp.control().map(|v| v.name.as_str()), Some("Control"));
    }

    #[test]
    fn days_analyzed_floors_at_one() {
        let mut exp = experiment(ExperimentStatus::Active);
        let now = Utc::now();

        exp.start_date = Some(now);
        assert_eq!(exp.days_analyzed(now), 1);

        exp.start_date = None;
        assert_eq!(exp.days_analyzed(now), 1);

        exp.start_date = Some(now - chrono::Duration::days(13));
        assert_eq!(exp.days_analyzed(now), 13);
    }
}
