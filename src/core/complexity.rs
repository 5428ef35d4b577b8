//! Complexity scoring and tier assignment.
//!
//! A task's tier is derived from the sum of its five complexity
//! dimensions. The mapping lives in [`TIER_TABLE`] and nowhere else.

use crate::core::task::{ComplexityDimensions, Task, MAX_DIMENSION};
use serde::{Deserialize, Serialize};

/// Coarse execution class derived from a task's complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    Standard,
    Elevated,
    High,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Low => write!(f, "low"),
            Tier::Standard => write!(f, "standard"),
            Tier::Elevated => write!(f, "elevated"),
            Tier::High => write!(f, "high"),
        }
    }
}

/// Tier bands by inclusive total range.
///
/// `Elevated` is conditional: a total in its band only reaches `Elevated`
/// when risk or ambiguity is at the maximum, otherwise it stays `Standard`.
pub const TIER_TABLE: [(u8, u8, Tier); 4] = [
    (0, 1, Tier::Low),
    (2, 3, Tier::Standard),
    (4, 6, Tier::Elevated),
    (7, 10, Tier::High),
];

/// Tier for a set of dimensions.
pub fn tier_for(dims: &ComplexityDimensions) -> Tier {
    let total = dims.total();
    let band = TIER_TABLE
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&total))
        .map(|(_, _, tier)| *tier)
        .unwrap_or(Tier::High);

    match band {
        Tier::Elevated if dims.risk < MAX_DIMENSION && dims.ambiguity < MAX_DIMENSION => {
            Tier::Standard
        }
        tier => tier,
    }
}

/// Score a task and return its execution tier.
pub fn score(task: &Task) -> Tier {
    tier_for(&task.complexity)
}
