use serde::{Deserialize, Serialize};

use crate::domain::experiment::ExperimentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantId(pub i64);

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One treatment arm of an experiment. The name is the stable join key the
/// storefront embed reports allocations under ("Control", "Variant A", ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub experiment_id: ExperimentId,
    pub name: String,
    pub is_control: bool,
}
