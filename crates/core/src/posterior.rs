//! Conjugate Beta posterior over a variant's true conversion rate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PosteriorError {
    #[error("counts out of range: {total_conversions} conversions over {total_users} users")]
    CountsOutOfRange { total_users: i64, total_conversions: i64 },
}

/// Beta(alpha, beta) belief about a conversion rate. Built from observed
/// counts with a Beta(1,1) uninformative prior, so both parameters are
/// strictly positive whenever the counts are valid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    pub alpha: f64,
    pub beta: f64,
}

impl Posterior {
    /// Standard conjugate update for Bernoulli conversion data:
    /// `alpha = conversions + 1`, `beta = users - conversions + 1`.
    pub fn from_counts(total_conversions: i64, total_users: i64) -> Result<Self, PosteriorError> {
        if total_users <= 0 || total_conversions < 0 || total_conversions > total_users {
            return Err(PosteriorError::CountsOutOfRange { total_users, total_conversions });
        }

        Ok(Self {
            alpha: (total_conversions + 1) as f64,
            beta: (total_users - total_conversions + 1) as f64,
        })
    }

    /// Revalidates parameters read back from storage. Rows with
    /// non-positive alpha or beta are corrupt and must be filtered out
    /// before estimation.
    pub fn from_parameters(alpha: f64, beta: f64) -> Option<Self> {
        (alpha > 0.0 && beta > 0.0 && alpha.is_finite() && beta.is_finite())
            .then_some(Self { alpha, beta })
    }

    /// Posterior mean, `alpha / (alpha + beta)`.
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}
