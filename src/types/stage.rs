//! Pipeline stage identifiers
//!
//! Stages run in a fixed order. A checkpoint records the last stage that
//! finished, so the stage order is also the resume order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ForgeError;

/// Stage identifier for checkpoint tracking
///
/// - 1: Design - design document, validated by the correction loop
/// - 2: PlanSkeleton - ordered phase outline
/// - 3: PlanDetail - per-phase steps
/// - 4: Handoff - handoff summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Design = 1,
    PlanSkeleton = 2,
    PlanDetail = 3,
    Handoff = 4,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        Self::Design,
        Self::PlanSkeleton,
        Self::PlanDetail,
        Self::Handoff,
    ];

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(stage: u8) -> Option<Self> {
        match stage {
            1 => Some(Self::Design),
            2 => Some(Self::PlanSkeleton),
            3 => Some(Self::PlanDetail),
            4 => Some(Self::Handoff),
            _ => None,
        }
    }

    /// Identifier used in checkpoints and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::PlanSkeleton => "plan_skeleton",
            Self::PlanDetail => "plan_detail",
            Self::Handoff => "handoff",
        }
    }

    /// Human-readable stage name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Design => "Design",
            Self::PlanSkeleton => "Plan Skeleton",
            Self::PlanDetail => "Plan Detail",
            Self::Handoff => "Handoff",
        }
    }

    /// Stage that runs after this one, `None` for the terminal stage
    pub fn next(&self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Handoff)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "design" => Ok(Self::Design),
            "plan_skeleton" => Ok(Self::PlanSkeleton),
            "plan_detail" => Ok(Self::PlanDetail),
            "handoff" => Ok(Self::Handoff),
            other => Err(ForgeError::UnknownStage(other.to_string())),
        }
    }
}
