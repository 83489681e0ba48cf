//! Design Validation and Correction Loop
//!
//! Validates a design, applies automatic fixes for correctable issues and
//! re-validates until the design converges, needs a human, or the
//! iteration budget runs out.
//!
//! ## State machine
//!
//! ```text
//! Validating ──valid & confident──────────────▶ Converged
//!     │  ────invalid & nothing to fix─────────▶ Escalated
//!     │  ────valid, unsure & nothing to fix───▶ Escalated
//!     │  ────pass budget spent────────────────▶ Exhausted
//!     ▼
//! Correcting ──one fix per correctable issue──▶ Validating
//! ```

mod corrector;
mod validator;

pub use corrector::{Correction, CorrectionContext, Corrector, LlmCorrector, strip_placeholders};
pub use validator::{ArtifactValidator, DesignValidator, REQUIRED_SECTIONS};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::constants::correction::{
    CONFIDENCE_THRESHOLD, ERROR_PENALTY, INFO_PENALTY, MAX_ITERATIONS, WARNING_PENALTY,
};
use crate::types::{DesignReview, ReviewOutcome, Result};

// =============================================================================
// Issues and Reports
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Design is unusable as-is
    Error,
    /// Usable but degraded
    Warning,
    Info,
}

impl IssueSeverity {
    pub fn penalty(&self) -> f32 {
        match self {
            Self::Error => ERROR_PENALTY,
            Self::Warning => WARNING_PENALTY,
            Self::Info => INFO_PENALTY,
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSeverity::Error => write!(f, "ERROR"),
            IssueSeverity::Warning => write!(f, "WARN"),
            IssueSeverity::Info => write!(f, "INFO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingSection,
    Contradiction,
    MissingScalability,
    TooShort,
    PlaceholderReference,
    OverEngineering,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSection => "missing_section",
            Self::Contradiction => "contradiction",
            Self::MissingScalability => "missing_scalability",
            Self::TooShort => "too_short",
            Self::PlaceholderReference => "placeholder_reference",
            Self::OverEngineering => "over_engineering",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    pub severity: IssueSeverity,
    pub auto_correctable: bool,
    /// What the issue is about: a section name or the offending patterns
    pub subject: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: IssueSeverity::Error,
            auto_correctable: false,
            subject: None,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn correctable(mut self) -> Self {
        self.auto_correctable = true;
        self
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// `code` or `code:subject`
    pub fn label(&self) -> String {
        match &self.subject {
            Some(subject) => format!("{}:{}", self.code, subject),
            None => self.code.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// No error-severity issues
    pub valid: bool,
    /// At least one issue can be fixed automatically
    pub auto_correctable: bool,
    pub confidence: f32,
    pub issues: Vec<ValidationIssue>,
    /// Pass/fail per named check
    pub checks: BTreeMap<String, bool>,
}

impl ValidationReport {
    /// Derive validity and confidence from the collected issues
    pub fn from_issues(issues: Vec<ValidationIssue>, checks: BTreeMap<String, bool>) -> Self {
        let penalty: f32 = issues.iter().map(|i| i.severity.penalty()).sum();
        Self {
            valid: !issues.iter().any(|i| i.severity == IssueSeverity::Error),
            auto_correctable: issues.iter().any(|i| i.auto_correctable),
            confidence: (1.0 - penalty).clamp(0.0, 1.0),
            issues,
            checks,
        }
    }

    pub fn correctable_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.auto_correctable)
    }
}

/// One applied fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub issue_code: IssueCode,
    pub action: String,
    pub before: String,
    pub after: String,
    pub explanation: String,
}

// =============================================================================
// Loop
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Validating,
    Correcting,
    Converged,
    Escalated,
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct CorrectionResult {
    pub final_text: String,
    pub validation: ValidationReport,
    pub outcome: ReviewOutcome,
    pub requires_human_review: bool,
    pub max_iterations_reached: bool,
    pub changes: Vec<ChangeRecord>,
    /// Validating passes run
    pub iterations_used: u32,
}

impl CorrectionResult {
    pub fn review(&self) -> DesignReview {
        DesignReview {
            outcome: self.outcome,
            iterations: self.iterations_used,
            confidence: self.validation.confidence,
            requires_human_review: self.requires_human_review,
            remaining_issues: self.validation.issues.iter().map(|i| i.label()).collect(),
            changes_applied: self.changes.len(),
        }
    }
}

pub struct CorrectionLoop {
    validator: Arc<dyn ArtifactValidator>,
    corrector: Arc<dyn Corrector>,
    max_iterations: u32,
    confidence_threshold: f32,
}

impl CorrectionLoop {
    pub fn new(validator: Arc<dyn ArtifactValidator>, corrector: Arc<dyn Corrector>) -> Self {
        Self {
            validator,
            corrector,
            max_iterations: MAX_ITERATIONS,
            confidence_threshold: CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    #[instrument(skip_all, fields(max_iterations = self.max_iterations))]
    pub async fn run(&self, text: &str, context: &CorrectionContext) -> Result<CorrectionResult> {
        let mut current = text.to_string();
        let mut changes = Vec::new();
        let mut iteration = 0;

        loop {
            iteration += 1;
            let report = self
                .validator
                .validate(&current, context.complexity.as_ref());
            let state = self.next_state(&report, iteration);
            debug!(
                "Pass {}: {} issue(s), confidence {:.2} -> {:?}",
                iteration,
                report.issues.len(),
                report.confidence,
                state
            );

            let outcome = match state {
                LoopState::Converged => ReviewOutcome::Converged,
                LoopState::Escalated => ReviewOutcome::Escalated,
                LoopState::Exhausted => ReviewOutcome::Exhausted,
                LoopState::Correcting | LoopState::Validating => {
                    for issue in report.correctable_issues() {
                        match self.corrector.correct(&current, issue, context).await? {
                            Some(correction) => {
                                current = correction.text;
                                changes.push(correction.change);
                            }
                            None => warn!("No correction available for {}", issue.label()),
                        }
                    }
                    continue;
                }
            };

            info!(
                "Design review {} after {} pass(es), {} change(s)",
                outcome.as_str(),
                iteration,
                changes.len()
            );
            return Ok(CorrectionResult {
                final_text: current,
                requires_human_review: outcome != ReviewOutcome::Converged,
                max_iterations_reached: outcome == ReviewOutcome::Exhausted,
                outcome,
                validation: report,
                changes,
                iterations_used: iteration,
            });
        }
    }

    fn next_state(&self, report: &ValidationReport, iteration: u32) -> LoopState {
        if report.valid && report.confidence > self.confidence_threshold {
            LoopState::Converged
        } else if !report.auto_correctable {
            LoopState::Escalated
        } else if iteration >= self.max_iterations {
            LoopState::Exhausted
        } else {
            LoopState::Correcting
        }
    }
}
