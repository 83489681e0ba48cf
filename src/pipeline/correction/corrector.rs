//! Automatic fixes for correctable design issues
//!
//! Missing sections are generated, placeholder references are stripped
//! without a model call, and over-engineered paragraphs are rewritten.
//! Every generated fragment is scrubbed of the pattern it was meant to fix
//! before it is spliced back in.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::validator::{HEAVY_PATTERNS, SCALABILITY};
use super::{ChangeRecord, IssueCode, ValidationIssue};
use crate::ai::{GenerationParams, SharedClient, SharedRenderer, TemplateContext};
use crate::constants::correction::{
    CORRECTION_TEMPERATURE, SECTION_MAX_TOKENS, SIMPLE_PROJECT_SCORE,
};
use crate::types::{ComplexityProfile, Result, truncate_chars};

const SNIPPET_CHARS: usize = 200;

static DROP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)lorem ipsum|\bacme\b").expect("drop regex is valid"));

static EXAMPLE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[([^\]]*)\]\([^)]*example\.(?:com|org|net)[^)]*\)")
        .expect("link regex is valid")
});

static EXAMPLE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\S*\bexample\.(?:com|org|net)\b\S*").expect("url regex is valid")
});

static INLINE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?i:citation needed)\]|\b(?:TBD|TODO)\b:?").expect("marker regex is valid")
});

/// What a corrector may need beyond the text itself
#[derive(Debug, Clone, Default)]
pub struct CorrectionContext {
    pub requirements: String,
    pub complexity: Option<ComplexityProfile>,
}

impl CorrectionContext {
    pub fn new(requirements: impl Into<String>) -> Self {
        Self {
            requirements: requirements.into(),
            complexity: None,
        }
    }

    pub fn with_complexity(mut self, complexity: Option<ComplexityProfile>) -> Self {
        self.complexity = complexity;
        self
    }

    fn is_simple_project(&self) -> bool {
        self.complexity
            .as_ref()
            .is_some_and(|c| c.score <= SIMPLE_PROJECT_SCORE)
    }
}

/// Corrected text plus the change that produced it
#[derive(Debug, Clone)]
pub struct Correction {
    pub text: String,
    pub change: ChangeRecord,
}

/// Applies one fix for one issue
#[async_trait]
pub trait Corrector: Send + Sync {
    /// `Ok(None)` when the issue has no automatic fix
    async fn correct(
        &self,
        text: &str,
        issue: &ValidationIssue,
        context: &CorrectionContext,
    ) -> Result<Option<Correction>>;
}

pub struct LlmCorrector {
    client: SharedClient,
    renderer: SharedRenderer,
    params: GenerationParams,
}

impl LlmCorrector {
    pub fn new(client: SharedClient, renderer: SharedRenderer) -> Self {
        Self {
            client,
            renderer,
            params: GenerationParams::default()
                .temperature(CORRECTION_TEMPERATURE)
                .max_tokens(SECTION_MAX_TOKENS),
        }
    }

    async fn add_section(
        &self,
        text: &str,
        section: &str,
        code: IssueCode,
        context: &CorrectionContext,
    ) -> Result<Correction> {
        let prompt = self.renderer.render(
            "correct_section",
            &TemplateContext::new()
                .with("section", section)
                .with("requirements", &context.requirements)
                .with("design", text),
        )?;
        let generated = self.client.complete(&prompt, &self.params).await?.content;

        let mut body = strip_placeholders(&strip_leading_headings(&generated));
        if context.is_simple_project() {
            body = drop_lines_matching(&body, &HEAVY_PATTERNS);
        }
        let mut addition = format!("## {}\n\n{}", section, body.trim());
        if code == IssueCode::MissingScalability && !SCALABILITY.is_match(&addition) {
            addition = format!("## Scalability\n\n{}", body.trim());
        }

        debug!("Generated {} section ({} chars)", section, body.len());
        Ok(Correction {
            text: format!("{}\n\n{}\n", text.trim_end(), addition.trim_end()),
            change: ChangeRecord {
                issue_code: code,
                action: "add_section".to_string(),
                before: String::new(),
                after: truncate_chars(&addition, SNIPPET_CHARS),
                explanation: format!("Generated the missing {} section", section),
            },
        })
    }

    async fn simplify(&self, text: &str, patterns: &str) -> Result<Correction> {
        let mut paragraphs = Vec::new();
        let mut before = Vec::new();
        let mut after = Vec::new();

        for paragraph in text.split("\n\n") {
            if !HEAVY_PATTERNS.is_match(paragraph) {
                paragraphs.push(paragraph.to_string());
                continue;
            }

            let (headings, body): (Vec<&str>, Vec<&str>) = paragraph
                .lines()
                .partition(|l| l.trim_start().starts_with('#'));
            let body = body.join("\n");

            let mut rewritten = String::new();
            if HEAVY_PATTERNS.is_match(&body) {
                let prompt = self.renderer.render(
                    "simplify_section",
                    &TemplateContext::new()
                        .with("patterns", patterns)
                        .with("paragraph", &body),
                )?;
                let response = self.client.complete(&prompt, &self.params).await?.content;
                rewritten = drop_lines_matching(&strip_placeholders(&response), &HEAVY_PATTERNS);
            } else if !body.trim().is_empty() {
                rewritten = body.clone();
            }

            let kept_headings = drop_lines_matching(&headings.join("\n"), &HEAVY_PATTERNS);
            let replacement = [kept_headings.trim(), rewritten.trim()]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("\n");

            before.push(paragraph.to_string());
            after.push(replacement.clone());
            if !replacement.is_empty() {
                paragraphs.push(replacement);
            }
        }

        Ok(Correction {
            text: paragraphs.join("\n\n"),
            change: ChangeRecord {
                issue_code: IssueCode::OverEngineering,
                action: "simplify".to_string(),
                before: truncate_chars(&before.join("\n\n"), SNIPPET_CHARS),
                after: truncate_chars(&after.join("\n\n"), SNIPPET_CHARS),
                explanation: format!("Replaced {} with simpler alternatives", patterns),
            },
        })
    }
}

#[async_trait]
impl Corrector for LlmCorrector {
    async fn correct(
        &self,
        text: &str,
        issue: &ValidationIssue,
        context: &CorrectionContext,
    ) -> Result<Option<Correction>> {
        let subject = issue.subject.as_deref();
        match issue.code {
            IssueCode::MissingSection | IssueCode::MissingScalability => {
                let section = subject.unwrap_or("Scalability");
                self.add_section(text, section, issue.code, context)
                    .await
                    .map(Some)
            }
            IssueCode::PlaceholderReference => {
                let cleaned = strip_placeholders(text);
                Ok(Some(Correction {
                    change: ChangeRecord {
                        issue_code: issue.code,
                        action: "strip_placeholders".to_string(),
                        before: truncate_chars(subject.unwrap_or(""), SNIPPET_CHARS),
                        after: String::new(),
                        explanation: "Removed placeholder and fictional references".to_string(),
                    },
                    text: cleaned,
                }))
            }
            IssueCode::OverEngineering => self
                .simplify(text, subject.unwrap_or("distributed infrastructure"))
                .await
                .map(Some),
            IssueCode::Contradiction | IssueCode::TooShort => Ok(None),
        }
    }
}

/// Remove placeholder text and fictional references.
///
/// Lines with filler text or made-up vendors are dropped, example-domain
/// links keep their label, and inline markers are deleted.
pub fn strip_placeholders(text: &str) -> String {
    let kept = drop_lines_matching(text, &DROP_LINE);
    let unlinked = EXAMPLE_LINK.replace_all(&kept, "$1");
    let no_urls = EXAMPLE_URL.replace_all(&unlinked, "");
    let no_markers = INLINE_MARKER.replace_all(&no_urls, "");
    no_markers
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn drop_lines_matching(text: &str, pattern: &Regex) -> String {
    text.lines()
        .filter(|l| !pattern.is_match(l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Generated section bodies sometimes repeat the heading
fn strip_leading_headings(text: &str) -> String {
    text.trim_start()
        .lines()
        .skip_while(|l| l.trim_start().starts_with('#') || l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::TemplateSet;
    use crate::ai::provider::testing::ScriptedClient;
    use crate::pipeline::correction::{
        ArtifactValidator, CorrectionLoop, DesignValidator, IssueSeverity,
    };
    use crate::types::{DepthLevel, ReviewOutcome};
    use std::sync::Arc;

    fn corrector(client: Arc<ScriptedClient>) -> LlmCorrector {
        LlmCorrector::new(client, Arc::new(TemplateSet::builtin()))
    }

    fn simple() -> CorrectionContext {
        CorrectionContext::new("a todo list").with_complexity(Some(ComplexityProfile {
            score: 2,
            depth_level: DepthLevel::Minimal,
            ..ComplexityProfile::default()
        }))
    }

    #[test]
    fn test_strip_placeholders() {
        let text = "Intro\n\
                    See [the docs](https://example.com/docs) or https://example.org/x now.\n\
                    Lorem ipsum dolor sit amet.\n\
                    Use the acme-client package.\n\
                    Caching strategy: TBD\n\
                    Proven at scale [citation needed].\n\
                    A todo app.";
        let cleaned = strip_placeholders(text);
        assert_eq!(
            cleaned,
            "Intro\nSee the docs or  now.\nCaching strategy:\nProven at scale .\nA todo app."
        );
        let report = DesignValidator::new().validate(&cleaned, None);
        assert!(!report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::PlaceholderReference));
    }

    #[tokio::test]
    async fn test_missing_section_appended_without_placeholders() {
        let client = Arc::new(
            ScriptedClient::new("mock").reply("## Testing\n\nUnit tests for each module. Coverage: TBD"),
        );
        let issue = ValidationIssue::error(IssueCode::MissingSection, "missing")
            .correctable()
            .about("Testing");

        let correction = corrector(client.clone())
            .correct("## Overview\nText", &issue, &CorrectionContext::new("reqs"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            correction.text,
            "## Overview\nText\n\n## Testing\n\nUnit tests for each module. Coverage:\n"
        );
        assert_eq!(correction.change.action, "add_section");
        assert!(client.calls()[0].prompt.contains("\"Testing\""));
        assert_eq!(client.calls()[0].params.temperature, Some(CORRECTION_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_simplify_never_reintroduces_patterns() {
        let client = Arc::new(
            ScriptedClient::new("mock")
                .reply("Use a single Postgres instance.\nOr maybe Kafka later."),
        );
        let text = "## Overview\nTodo app.\n\n## Architecture\nRun it on Kubernetes.";
        let issue = ValidationIssue::warning(IssueCode::OverEngineering, "heavy")
            .correctable()
            .about("kubernetes");

        let correction = corrector(client)
            .correct(text, &issue, &simple())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            correction.text,
            "## Overview\nTodo app.\n\n## Architecture\nUse a single Postgres instance."
        );
        assert!(!HEAVY_PATTERNS.is_match(&correction.text));
    }

    #[tokio::test]
    async fn test_unfixable_issues_return_none() {
        let client = Arc::new(ScriptedClient::new("mock"));
        let issue = ValidationIssue::error(IssueCode::Contradiction, "both");
        let result = corrector(client.clone())
            .correct("text", &issue, &CorrectionContext::default())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_loop_with_design_validator_converges() {
        let client = Arc::new(ScriptedClient::new("mock").with_fallback("Unit and integration tests."));
        let design = "## Overview\nTodo app.\n## Architecture\nOne process.\n\
                      ## Components\nAPI.\n## Data Model\nTasks.\n## Error Handling\nTyped.\n\
                      Docs at https://example.com/api.";

        let result = CorrectionLoop::new(Arc::new(DesignValidator::new()), Arc::new(corrector(client)))
            .run(design, &simple())
            .await
            .unwrap();

        assert_eq!(result.outcome, ReviewOutcome::Converged);
        assert_eq!(result.iterations_used, 2);
        assert_eq!(result.changes.len(), 2);
        assert!(result.final_text.contains("## Testing\n\nUnit and integration tests."));
        assert!(!result.final_text.contains("example.com"));
        assert!(result
            .validation
            .issues
            .iter()
            .all(|i| i.severity != IssueSeverity::Error));
    }
}
