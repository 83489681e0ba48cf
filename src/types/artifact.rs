//! Stage artifacts
//!
//! Each stage consumes the previous artifact and produces a new immutable
//! one. Artifacts serialize into checkpoint payloads.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

// =============================================================================
// Inputs
// =============================================================================

/// Requested depth of the generated documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthLevel {
    Minimal,
    #[default]
    Standard,
    Detailed,
    Comprehensive,
}

impl DepthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
            Self::Comprehensive => "comprehensive",
        }
    }

    /// Shortest design document accepted at this depth
    pub fn min_design_chars(&self) -> usize {
        match self {
            Self::Minimal => 0,
            Self::Standard => 0,
            Self::Detailed => 2_000,
            Self::Comprehensive => 4_000,
        }
    }
}

/// Project complexity estimate supplied alongside the requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityProfile {
    /// 1 (trivial) to 10 (large distributed system)
    pub score: u8,
    pub estimated_phase_count: u32,
    pub depth_level: DepthLevel,
    pub confidence: f32,
}

impl Default for ComplexityProfile {
    fn default() -> Self {
        Self {
            score: 5,
            estimated_phase_count: 4,
            depth_level: DepthLevel::Standard,
            confidence: 0.5,
        }
    }
}

/// Everything the pipeline needs to start a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInputs {
    pub project_name: String,
    pub requirements: String,
    #[serde(default)]
    pub complexity: Option<ComplexityProfile>,
}

impl PipelineInputs {
    pub fn new(project_name: impl Into<String>, requirements: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            requirements: requirements.into(),
            complexity: None,
        }
    }

    pub fn with_complexity(mut self, complexity: ComplexityProfile) -> Self {
        self.complexity = Some(complexity);
        self
    }
}

// =============================================================================
// Design
// =============================================================================

/// How the design review loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Converged,
    Escalated,
    Exhausted,
    /// Validation disabled in configuration
    Skipped,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Escalated => "escalated",
            Self::Exhausted => "exhausted",
            Self::Skipped => "skipped",
        }
    }
}

/// Summary of the validation and correction applied to a design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignReview {
    pub outcome: ReviewOutcome,
    pub iterations: u32,
    pub confidence: f32,
    pub requires_human_review: bool,
    /// Codes of issues still present after the last validation
    pub remaining_issues: Vec<String>,
    pub changes_applied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub content: String,
    #[serde(default)]
    pub review: Option<DesignReview>,
}

// =============================================================================
// Plan
// =============================================================================

/// Phase heading from the plan skeleton, before steps are generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutline {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSkeleton {
    pub phases: Vec<PhaseOutline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// `<phase>.<index>`
    pub number: String,
    pub description: String,
    #[serde(default)]
    pub details: Vec<String>,
    #[serde(default)]
    pub done: bool,
}

impl Step {
    pub fn new(phase: u32, index: usize, description: impl Into<String>) -> Self {
        Self {
            number: format!("{}.{}", phase, index),
            description: description.into(),
            details: Vec::new(),
            done: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub number: u32,
    pub title: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedPlan {
    pub phases: Vec<Phase>,
}

impl DetailedPlan {
    pub fn step_count(&self) -> usize {
        self.phases.iter().map(|p| p.steps.len()).sum()
    }

    /// Markdown checklist used as handoff input and CLI output
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for phase in &self.phases {
            let _ = writeln!(out, "## Phase {}: {}\n", phase.number, phase.title);
            for step in &phase.steps {
                let mark = if step.done { "x" } else { " " };
                let _ = writeln!(out, "- [{}] {}: {}", mark, step.number, step.description);
                for detail in &step.details {
                    let _ = writeln!(out, "  - {}", detail);
                }
            }
            out.push('\n');
        }
        out
    }
}

// =============================================================================
// Handoff
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffSummary {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_markdown() {
        let mut step = Step::new(1, 1, "Create repository");
        step.details.push("add README".to_string());
        let plan = DetailedPlan {
            phases: vec![Phase {
                number: 1,
                title: "Setup".to_string(),
                steps: vec![step],
            }],
        };

        let md = plan.to_markdown();
        assert!(md.contains("## Phase 1: Setup"));
        assert!(md.contains("- [ ] 1.1: Create repository"));
        assert!(md.contains("  - add README"));
        assert_eq!(plan.step_count(), 1);
    }

    #[test]
    fn test_inputs_default_complexity() {
        let inputs: PipelineInputs =
            serde_json::from_str(r#"{"project_name":"a","requirements":"b"}"#).unwrap();
        assert!(inputs.complexity.is_none());
    }
}
