//! Design document checks
//!
//! All checks are deterministic text inspections; no generation calls.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{IssueCode, ValidationIssue, ValidationReport};
use crate::constants::correction::{SCALABILITY_SCORE, SIMPLE_PROJECT_SCORE};
use crate::types::ComplexityProfile;

/// Headings every design must carry, with accepted heading keywords
pub const REQUIRED_SECTIONS: &[(&str, &[&str])] = &[
    ("Overview", &["overview", "summary", "introduction"]),
    ("Architecture", &["architecture"]),
    ("Components", &["component", "modules"]),
    ("Data Model", &["data model", "data", "schema"]),
    ("Error Handling", &["error"]),
    ("Testing", &["test"]),
];

pub(crate) static SCALABILITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bscal(?:ab|ing|e\b)").expect("scalability regex is valid"));

pub(crate) static PLACEHOLDER_MARKERS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("example domain link", r"(?i)\bexample\.(?:com|org|net)\b"),
        ("lorem ipsum", r"(?i)lorem ipsum"),
        ("TBD/TODO marker", r"\b(?:TBD|TODO)\b"),
        ("citation needed", r"(?i)\[citation needed\]"),
        ("acme reference", r"(?i)\bacme\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("marker regex is valid")))
    .collect()
});

pub(crate) static HEAVY_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(kubernetes|k8s|service mesh|istio|kafka|cqrs|event sourcing|sharding|sharded)\b",
    )
    .expect("pattern regex is valid")
});

/// Markers that make an architecture claim binding
static MANDATORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:must|shall|required|only|exclusively|will use|will be)\b")
        .expect("mandatory regex is valid")
});

/// Negations that turn a binding sentence into a rejection
static NEGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:not|no|never|avoid|without|instead of|rather than)\b|\w+n't\b")
        .expect("negation regex is valid")
});

/// Mutually exclusive architecture claims
static EXCLUSIVE_PAIRS: LazyLock<Vec<(&'static str, Regex, Regex)>> = LazyLock::new(|| {
    [
        (
            "monolith vs microservices",
            r"(?i)\bmonolith(?:ic)?\b",
            r"(?i)\bmicro-?services?\b",
        ),
        (
            "SQL vs NoSQL primary store",
            r"(?i)\b(?:postgres(?:ql)?|mysql|sqlite|relational database|sql database)\b",
            r"(?i)\b(?:nosql|mongodb|dynamodb|cassandra|document database)\b",
        ),
        (
            "synchronous-only vs event-driven-only",
            r"(?i)\bsynchronous(?: request/response)?\b",
            r"(?i)\bevent-driven\b",
        ),
    ]
    .into_iter()
    .map(|(name, a, b)| {
        (
            name,
            Regex::new(a).expect("pair regex is valid"),
            Regex::new(b).expect("pair regex is valid"),
        )
    })
    .collect()
});

/// Validates an artifact's text
pub trait ArtifactValidator: Send + Sync {
    fn validate(&self, text: &str, complexity: Option<&ComplexityProfile>) -> ValidationReport;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DesignValidator;

impl DesignValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_completeness(&self, text: &str, issues: &mut Vec<ValidationIssue>) -> bool {
        let headings = headings(text);
        let mut passed = true;
        for (section, keywords) in REQUIRED_SECTIONS {
            let present = headings
                .iter()
                .any(|h| keywords.iter().any(|k| h.contains(k)));
            if !present {
                passed = false;
                issues.push(
                    ValidationIssue::error(
                        IssueCode::MissingSection,
                        format!("Missing required section: {}", section),
                    )
                    .correctable()
                    .about(*section),
                );
            }
        }
        passed
    }

    fn check_consistency(&self, text: &str, issues: &mut Vec<ValidationIssue>) -> bool {
        let binding: Vec<&str> = sentences(text)
            .filter(|s| MANDATORY.is_match(s) && !NEGATION.is_match(s))
            .collect();

        let mut passed = true;
        for (name, a, b) in EXCLUSIVE_PAIRS.iter() {
            let claims_a = binding.iter().any(|s| a.is_match(s) && !b.is_match(s));
            let claims_b = binding.iter().any(|s| b.is_match(s) && !a.is_match(s));
            if claims_a && claims_b {
                passed = false;
                issues.push(
                    ValidationIssue::error(
                        IssueCode::Contradiction,
                        format!("Design mandates both sides of {}", name),
                    )
                    .about(*name),
                );
            }
        }
        passed
    }

    fn check_scope(
        &self,
        text: &str,
        complexity: &ComplexityProfile,
        issues: &mut Vec<ValidationIssue>,
    ) -> bool {
        let mut passed = true;

        if complexity.score >= SCALABILITY_SCORE && !SCALABILITY.is_match(text) {
            passed = false;
            issues.push(
                ValidationIssue::warning(
                    IssueCode::MissingScalability,
                    format!(
                        "Complexity {} design does not discuss scalability",
                        complexity.score
                    ),
                )
                .correctable()
                .about("Scalability"),
            );
        }

        let min_chars = complexity.depth_level.min_design_chars();
        let length = text.chars().count();
        if length < min_chars {
            passed = false;
            issues.push(ValidationIssue::warning(
                IssueCode::TooShort,
                format!(
                    "{} chars is below the {} minimum of {}",
                    length,
                    complexity.depth_level.as_str(),
                    min_chars
                ),
            ));
        }

        passed
    }

    fn check_placeholders(&self, text: &str, issues: &mut Vec<ValidationIssue>) -> bool {
        let found: Vec<&str> = PLACEHOLDER_MARKERS
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| *name)
            .collect();

        if found.is_empty() {
            return true;
        }
        issues.push(
            ValidationIssue::warning(
                IssueCode::PlaceholderReference,
                format!("Placeholder or fictional references: {}", found.join(", ")),
            )
            .correctable()
            .about(found.join(", ")),
        );
        false
    }

    fn check_over_engineering(
        &self,
        text: &str,
        complexity: &ComplexityProfile,
        issues: &mut Vec<ValidationIssue>,
    ) -> bool {
        if complexity.score > SIMPLE_PROJECT_SCORE {
            return true;
        }
        let mut found: Vec<String> = HEAVY_PATTERNS
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        found.sort();
        found.dedup();

        if found.is_empty() {
            return true;
        }
        issues.push(
            ValidationIssue::warning(
                IssueCode::OverEngineering,
                format!(
                    "Complexity {} project proposes {}",
                    complexity.score,
                    found.join(", ")
                ),
            )
            .correctable()
            .about(found.join(", ")),
        );
        false
    }
}

impl ArtifactValidator for DesignValidator {
    fn validate(&self, text: &str, complexity: Option<&ComplexityProfile>) -> ValidationReport {
        let mut issues = Vec::new();
        let mut checks = BTreeMap::new();

        checks.insert(
            "completeness".to_string(),
            self.check_completeness(text, &mut issues),
        );
        checks.insert(
            "consistency".to_string(),
            self.check_consistency(text, &mut issues),
        );
        checks.insert(
            "hallucination".to_string(),
            self.check_placeholders(text, &mut issues),
        );
        if let Some(complexity) = complexity {
            checks.insert(
                "scope".to_string(),
                self.check_scope(text, complexity, &mut issues),
            );
            checks.insert(
                "over_engineering".to_string(),
                self.check_over_engineering(text, complexity, &mut issues),
            );
        }

        ValidationReport::from_issues(issues, checks)
    }
}

/// Lowercased heading texts
fn headings(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim().to_lowercase())
        .collect()
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
