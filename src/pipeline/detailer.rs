//! Phase Detailer
//!
//! Expands every skeleton phase into ordered steps. Phases are detailed
//! concurrently behind the [`ConcurrencyGate`] and reassembled in phase
//! order. Unparseable responses are re-prompted with stricter templates;
//! a phase that still yields nothing gets one placeholder step, so no
//! phase ever comes back empty.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::ai::{GenerationParams, SharedClient, SharedRenderer, TemplateContext};
use crate::constants::detail::{
    MAX_RETRIES, PLACEHOLDER_STEP, RETRY_MAX_TOKENS, RETRY_TEMPERATURE,
};
use crate::pipeline::gate::ConcurrencyGate;
use crate::pipeline::swarm::{HiveMind, SwarmSinks};
use crate::types::{ForgeError, Phase, PhaseOutline, Result, Step};

/// `<phase>.<index>: <description>`, optionally behind list, heading or bold markers
static STEP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\s\-*#•+>]*(\d+)\.(\d+)\s*:(?:\*\*)?\s*(.+?)\s*(?:\*\*)?$")
        .expect("step regex is valid")
});

static DETAIL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*•+]\s+(.+?)\s*$").expect("detail regex is valid"));

/// One detailed phase plus the response it was parsed from
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub phase: Phase,
    pub raw_response: String,
    pub response_len: usize,
}

/// Notified once per detailed phase
pub trait PhaseObserver: Send + Sync {
    fn on_phase_complete(&self, result: &PhaseResult);
}

pub type SharedObserver = Arc<dyn PhaseObserver>;

/// Plan-wide context shared by every phase prompt
#[derive(Debug, Clone)]
pub struct DetailContext {
    pub project_name: String,
    pub plan_outline: String,
    pub design_excerpt: String,
}

pub struct PhaseDetailer {
    client: SharedClient,
    renderer: SharedRenderer,
    gate: ConcurrencyGate,
    hive: Option<HiveMind>,
    params: GenerationParams,
}

impl PhaseDetailer {
    pub fn new(client: SharedClient, renderer: SharedRenderer, gate: ConcurrencyGate) -> Self {
        Self {
            client,
            renderer,
            gate,
            hive: None,
            params: GenerationParams::default(),
        }
    }

    /// Route first attempts through a swarm
    pub fn with_hive(mut self, hive: HiveMind) -> Self {
        self.hive = Some(hive);
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Detail all phases, at most `gate.capacity()` at a time.
    ///
    /// Duplicate phase numbers keep their first occurrence, and the result
    /// follows first-occurrence order.
    #[instrument(skip_all, fields(phases = phases.len()))]
    pub async fn detail_all(
        &self,
        phases: &[PhaseOutline],
        context: &DetailContext,
        observer: Option<&SharedObserver>,
    ) -> Result<Vec<Phase>> {
        let mut seen = HashSet::new();
        let mut unique: Vec<&PhaseOutline> = Vec::with_capacity(phases.len());
        for outline in phases {
            if seen.insert(outline.number) {
                unique.push(outline);
            } else {
                warn!(
                    "Dropping duplicate phase {} ({})",
                    outline.number, outline.title
                );
            }
        }

        let tasks = unique.iter().map(|outline| async move {
            let result = self.detail(outline, context).await?;
            if let Some(observer) = observer {
                observer.on_phase_complete(&result);
            }
            Ok::<_, ForgeError>(result.phase)
        });

        let mut detailed = Vec::with_capacity(unique.len());
        for result in self.gate.gather_bounded(tasks).await {
            detailed.push(result?);
        }

        info!(
            "Detailed {} phases ({} steps)",
            detailed.len(),
            detailed.iter().map(|p| p.steps.len()).sum::<usize>()
        );
        Ok(detailed)
    }

    /// Detail one phase with re-prompts and placeholder fallback
    pub async fn detail(&self, outline: &PhaseOutline, context: &DetailContext) -> Result<PhaseResult> {
        let mut raw = self.first_attempt(outline, context).await?;
        let mut steps = parse_steps(outline.number, &raw);

        let mut retry = 0;
        while steps.is_empty() && retry < MAX_RETRIES {
            debug!(
                "Phase {} produced no steps, re-prompting ({}/{})",
                outline.number,
                retry + 1,
                MAX_RETRIES
            );
            raw = self.retry_attempt(outline, context, retry).await?;
            steps = parse_steps(outline.number, &raw);
            retry += 1;
        }

        if steps.is_empty() {
            warn!(
                "Phase {} still has no parseable steps, using placeholder",
                outline.number
            );
            steps.push(Step::new(outline.number, 1, PLACEHOLDER_STEP));
        }

        let response_len = raw.len();
        Ok(PhaseResult {
            phase: Phase {
                number: outline.number,
                title: outline.title.clone(),
                steps,
            },
            raw_response: raw,
            response_len,
        })
    }

    async fn first_attempt(&self, outline: &PhaseOutline, context: &DetailContext) -> Result<String> {
        let prompt = self.renderer.render(
            "phase_detail",
            &TemplateContext::new()
                .with("project_name", &context.project_name)
                .with("plan_outline", &context.plan_outline)
                .with("design_excerpt", &context.design_excerpt)
                .with("phase_number", outline.number)
                .with("phase_title", &outline.title)
                .with("phase_summary", outline.summary.as_deref().unwrap_or("")),
        )?;

        match &self.hive {
            Some(hive) => {
                let result = hive
                    .run(
                        self.client.as_ref(),
                        &prompt,
                        self.params.max_tokens,
                        &SwarmSinks::default(),
                    )
                    .await?;
                Ok(result.text)
            }
            None => Ok(self.client.complete(&prompt, &self.params).await?.content),
        }
    }

    async fn retry_attempt(
        &self,
        outline: &PhaseOutline,
        context: &DetailContext,
        retry: usize,
    ) -> Result<String> {
        let template = if retry == 0 {
            "phase_detail_strict"
        } else {
            "phase_detail_minimal"
        };
        let prompt = self.renderer.render(
            template,
            &TemplateContext::new()
                .with("phase_number", outline.number)
                .with("phase_title", &outline.title)
                .with("plan_outline", &context.plan_outline),
        )?;

        let max_tokens = RETRY_MAX_TOKENS[retry.min(RETRY_MAX_TOKENS.len() - 1)];
        let params = GenerationParams::default()
            .temperature(RETRY_TEMPERATURE)
            .max_tokens(max_tokens);
        Ok(self.client.complete(&prompt, &params).await?.content)
    }
}

/// Parse step lines for `phase` from a response.
///
/// Bullets after a step line become its details. Step lines for other
/// phases are skipped along with their bullets. Indices are reassigned
/// 1..n in order of appearance.
pub fn parse_steps(phase: u32, text: &str) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    let mut collecting = false;

    for line in text.lines() {
        if let Some(caps) = STEP_LINE.captures(line) {
            let number: Option<u32> = caps[1].parse().ok();
            collecting = number == Some(phase);
            if collecting {
                steps.push(Step::new(phase, steps.len() + 1, caps[3].trim()));
            }
            continue;
        }

        if collecting
            && let Some(caps) = DETAIL_LINE.captures(line)
            && let Some(step) = steps.last_mut()
        {
            step.details.push(caps[1].to_string());
        }
    }

    steps
}
