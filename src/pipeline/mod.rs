//! Planning Pipeline
//!
//! Four stages turn requirements into an implementation handoff:
//!
//! 1. **Design**: design document, validated and corrected
//! 2. **Plan Skeleton**: ordered phase outline
//! 3. **Plan Detail**: steps for every phase, detailed concurrently
//! 4. **Handoff**: summary for the implementing engineers
//!
//! ## Checkpoint/Resume
//!
//! State is checkpointed after every stage under one run key. A resumed
//! run decodes the snapshot, reuses the recorded parameters and runs only
//! the stages that had not finished.

pub mod checkpoint;
pub mod correction;
pub mod detailer;
pub mod gate;
pub mod params;
pub mod stages;
pub mod swarm;

pub use checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointStore, CheckpointSummary, FileCheckpointStore,
    SharedCheckpointStore, SqliteCheckpointStore, new_run_key, open_store,
};
pub use correction::{
    ArtifactValidator, CorrectionContext, CorrectionLoop, CorrectionResult, Corrector,
    DesignValidator, LlmCorrector, ValidationIssue, ValidationReport,
};
pub use detailer::{PhaseDetailer, PhaseObserver, PhaseResult, SharedObserver};
pub use gate::ConcurrencyGate;
pub use params::PipelineParams;
pub use swarm::{HiveMind, HiveMindResult, SwarmSinks};

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::ai::{
    ClientFactory, GenerationParams, SharedClient, SharedRenderer, SharedSink, TemplateContext,
    complete_with_sink,
};
use crate::config::Config;
use crate::types::{
    Design, DesignReview, DetailedPlan, ForgeError, HandoffSummary, PipelineInputs, PlanSkeleton,
    Result, ReviewOutcome, StageKind,
};
use detailer::DetailContext;

// =============================================================================
// State
// =============================================================================

/// Everything produced so far; serialized as the checkpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub inputs: PipelineInputs,
    #[serde(default)]
    pub design: Option<Design>,
    #[serde(default)]
    pub skeleton: Option<PlanSkeleton>,
    #[serde(default)]
    pub detailed_plan: Option<DetailedPlan>,
    #[serde(default)]
    pub handoff: Option<HandoffSummary>,
}

impl PipelineState {
    pub fn new(inputs: PipelineInputs) -> Self {
        Self {
            inputs,
            design: None,
            skeleton: None,
            detailed_plan: None,
            handoff: None,
        }
    }

    /// Last stage whose artifact is present
    pub fn completed_stage(&self) -> Option<StageKind> {
        StageKind::ALL
            .into_iter()
            .rev()
            .find(|&stage| self.has_artifact(stage))
    }

    fn has_artifact(&self, stage: StageKind) -> bool {
        match stage {
            StageKind::Design => self.design.is_some(),
            StageKind::PlanSkeleton => self.skeleton.is_some(),
            StageKind::PlanDetail => self.detailed_plan.is_some(),
            StageKind::Handoff => self.handoff.is_some(),
        }
    }

    /// Decode a checkpoint payload, requiring exactly the artifacts of `stage`
    pub fn decode(checkpoint: &Checkpoint) -> Result<Self> {
        let state: Self = serde_json::from_value(checkpoint.payload.clone()).map_err(|e| {
            ForgeError::corrupt(&checkpoint.key, format!("payload does not decode: {}", e))
        })?;

        for stage in StageKind::ALL {
            let expected = stage <= checkpoint.stage;
            if state.has_artifact(stage) != expected {
                return Err(ForgeError::corrupt(
                    &checkpoint.key,
                    format!(
                        "stage '{}' checkpoint {} a {} artifact",
                        checkpoint.stage,
                        if expected { "lacks" } else { "unexpectedly has" },
                        stage
                    ),
                ));
            }
        }
        Ok(state)
    }

    fn require_design(&self, stage: StageKind) -> Result<&Design> {
        self.design
            .as_ref()
            .ok_or_else(|| ForgeError::pipeline(stage, "design has not been produced"))
    }

    fn require_skeleton(&self, stage: StageKind) -> Result<&PlanSkeleton> {
        self.skeleton
            .as_ref()
            .ok_or_else(|| ForgeError::pipeline(stage, "plan skeleton has not been produced"))
    }

    fn require_plan(&self, stage: StageKind) -> Result<&DetailedPlan> {
        self.detailed_plan
            .as_ref()
            .ok_or_else(|| ForgeError::pipeline(stage, "detailed plan has not been produced"))
    }

    fn into_output(self, key: String) -> Result<PipelineOutput> {
        match (self.design, self.detailed_plan, self.handoff) {
            (Some(design), Some(plan), Some(handoff)) => Ok(PipelineOutput {
                key,
                design,
                plan,
                handoff,
            }),
            _ => Err(ForgeError::pipeline(
                StageKind::Handoff,
                "pipeline finished without all artifacts",
            )),
        }
    }
}

/// Final artifacts of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Checkpoint key of the run
    pub key: String,
    pub design: Design,
    pub plan: DetailedPlan,
    pub handoff: HandoffSummary,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Configuration plus client factory, needed to rebuild clients
#[derive(Clone)]
struct ProviderContext {
    config: Config,
    factory: ClientFactory,
}

pub struct PipelineOrchestrator {
    client: SharedClient,
    stage_clients: HashMap<StageKind, SharedClient>,
    stage_temperatures: HashMap<StageKind, f32>,
    store: SharedCheckpointStore,
    renderer: SharedRenderer,
    validator: Arc<dyn ArtifactValidator>,
    corrector: Option<Arc<dyn Corrector>>,
    observer: Option<SharedObserver>,
    sink: Option<SharedSink>,
    params: PipelineParams,
    context: Option<ProviderContext>,
}

impl PipelineOrchestrator {
    pub fn new(client: SharedClient, store: SharedCheckpointStore, renderer: SharedRenderer) -> Self {
        Self {
            client,
            stage_clients: HashMap::new(),
            stage_temperatures: HashMap::new(),
            store,
            renderer,
            validator: Arc::new(DesignValidator::new()),
            corrector: None,
            observer: None,
            sink: None,
            params: PipelineParams::default(),
            context: None,
        }
    }

    /// Build clients, stage overrides and parameters from configuration
    pub fn from_config(
        config: &Config,
        factory: ClientFactory,
        store: SharedCheckpointStore,
        renderer: SharedRenderer,
    ) -> Result<Self> {
        let client = factory(&config.provider_config())?;
        let mut orchestrator = Self::new(client, store, renderer)
            .with_params(PipelineParams::from(config))
            .with_provider_context(config.clone(), factory.clone());

        for stage in StageKind::ALL {
            if let Some(provider_config) = config.stage_provider_config(stage) {
                orchestrator
                    .stage_clients
                    .insert(stage, factory(&provider_config)?);
            }
            if let Some(temperature) = config
                .stages
                .for_stage(stage)
                .and_then(|o| o.temperature)
            {
                orchestrator.stage_temperatures.insert(stage, temperature);
            }
        }
        Ok(orchestrator)
    }

    /// Use `client` for `stage` instead of the default client
    pub fn with_stage_client(mut self, stage: StageKind, client: SharedClient) -> Self {
        self.stage_clients.insert(stage, client);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn ArtifactValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Defaults to an [`LlmCorrector`] on the design client
    pub fn with_corrector(mut self, corrector: Arc<dyn Corrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Stream design, skeleton and handoff tokens into `sink`
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_params(mut self, params: PipelineParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_provider_context(mut self, config: Config, factory: ClientFactory) -> Self {
        self.context = Some(ProviderContext { config, factory });
        self
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Name of the default provider
    pub fn provider(&self) -> &str {
        self.client.name()
    }

    pub fn store(&self) -> &SharedCheckpointStore {
        &self.store
    }

    /// Rebuild the default client for provider `name`.
    ///
    /// Stage overrides are left alone and keep precedence.
    pub fn switch_provider(&mut self, name: &str) -> Result<()> {
        self.switch_to(name, None)
    }

    fn switch_to(&mut self, name: &str, model: Option<&str>) -> Result<()> {
        let context = self.context.as_ref().ok_or_else(|| {
            ForgeError::Config(format!(
                "Cannot switch to provider '{}': orchestrator has no configuration context",
                name
            ))
        })?;

        let mut provider_config = context.config.provider_config();
        if provider_config.provider != name {
            provider_config.provider = name.to_string();
            provider_config.model = None;
        }
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            provider_config.model = Some(model.to_string());
        }

        self.client = (context.factory)(&provider_config)?;
        info!(
            "Switched provider to {} (model {})",
            self.client.name(),
            self.client.model()
        );
        Ok(())
    }

    /// Run all stages for new inputs under a fresh key
    pub async fn run_full(&self, inputs: PipelineInputs) -> Result<PipelineOutput> {
        let key = new_run_key(&inputs.project_name);
        self.run_with_key(key, inputs).await
    }

    /// Run all stages, checkpointing under a caller-chosen key
    #[instrument(skip_all, fields(project = %inputs.project_name, key = %key))]
    pub async fn run_with_key(&self, key: String, inputs: PipelineInputs) -> Result<PipelineOutput> {
        checkpoint::validate_key(&key)?;
        info!("Starting run {}", key);
        self.run_from(key, PipelineState::new(inputs)).await
    }

    /// Continue a run from its checkpoint.
    ///
    /// A checkpoint that already finished the handoff returns its artifacts
    /// without any generation call.
    pub async fn resume_from(&mut self, key: &str) -> Result<PipelineOutput> {
        self.resume(key, None).await
    }

    /// Resume, then continue the remaining stages on `provider`
    pub async fn resume_with_provider(&mut self, key: &str, provider: &str) -> Result<PipelineOutput> {
        self.resume(key, Some(provider)).await
    }

    #[instrument(skip(self))]
    async fn resume(&mut self, key: &str, provider: Option<&str>) -> Result<PipelineOutput> {
        let checkpoint = self
            .store
            .load(key)
            .await?
            .ok_or_else(|| ForgeError::CheckpointNotFound {
                key: key.to_string(),
            })?;
        let state = PipelineState::decode(&checkpoint)?;

        if checkpoint.stage.is_terminal() {
            info!("Checkpoint {} is complete, nothing to resume", key);
            return state.into_output(key.to_string());
        }

        self.params = checkpoint.metadata.stage_params.clone();
        let recorded = &checkpoint.metadata.provider;
        if let Some(provider) = provider {
            self.switch_provider(provider)?;
        } else if recorded != self.client.name() {
            if self.context.is_some() {
                self.switch_to(recorded, Some(&checkpoint.metadata.model))?;
            } else {
                warn!(
                    "Checkpoint was written by {}, continuing with {}",
                    recorded,
                    self.client.name()
                );
            }
        }

        info!("Resuming {} after {}", key, checkpoint.stage.name());
        self.run_from(key.to_string(), state).await
    }

    async fn run_from(&self, key: String, mut state: PipelineState) -> Result<PipelineOutput> {
        let mut next = match state.completed_stage() {
            Some(done) => done.next(),
            None => Some(StageKind::Design),
        };

        while let Some(stage) = next {
            info!("Stage {}: {}", stage.as_u8(), stage.name());
            self.run_stage(stage, &mut state).await?;
            self.save_checkpoint(&key, stage, &state).await?;
            next = stage.next();
        }

        info!("Run {} complete", key);
        state.into_output(key)
    }

    async fn run_stage(&self, stage: StageKind, state: &mut PipelineState) -> Result<()> {
        match stage {
            StageKind::Design => {
                state.design = Some(self.design_stage(&state.inputs).await?);
            }
            StageKind::PlanSkeleton => {
                let design = state.require_design(stage)?;
                state.skeleton = Some(self.skeleton_stage(&state.inputs, design).await?);
            }
            StageKind::PlanDetail => {
                let design = state.require_design(stage)?;
                let skeleton = state.require_skeleton(stage)?;
                state.detailed_plan =
                    Some(self.detail_stage(&state.inputs, design, skeleton).await?);
            }
            StageKind::Handoff => {
                let design = state.require_design(stage)?;
                let plan = state.require_plan(stage)?;
                state.handoff = Some(self.handoff_stage(&state.inputs, design, plan).await?);
            }
        }
        Ok(())
    }

    async fn save_checkpoint(&self, key: &str, stage: StageKind, state: &PipelineState) -> Result<()> {
        let metadata = CheckpointMetadata {
            provider: self.client.name().to_string(),
            model: self.client.model().to_string(),
            stage_params: self.params.clone(),
        };
        self.store
            .save(key, stage, serde_json::to_value(state)?, metadata)
            .await?;
        Ok(())
    }

    fn client_for(&self, stage: StageKind) -> &SharedClient {
        self.stage_clients.get(&stage).unwrap_or(&self.client)
    }

    fn generation_params(&self, stage: StageKind) -> GenerationParams {
        let params = self.params.generation();
        match self.stage_temperatures.get(&stage) {
            Some(&temperature) => params.temperature(temperature),
            None => params,
        }
    }

    // =========================================================================
    // Stages
    // =========================================================================

    #[instrument(skip_all)]
    async fn design_stage(&self, inputs: &PipelineInputs) -> Result<Design> {
        let stage = StageKind::Design;
        let client = self.client_for(stage);
        let complexity = stages::effective_complexity(inputs);
        let prompt = self.renderer.render(
            "design",
            &TemplateContext::new()
                .with("project_name", &inputs.project_name)
                .with("requirements", &inputs.requirements)
                .with("complexity_score", complexity.score)
                .with("depth_level", complexity.depth_level.as_str())
                .with("required_sections", stages::required_sections()),
        )?;

        let draft = if self.params.swarm.enabled_for_design {
            HiveMind::from_config(self.renderer.clone(), &self.params.swarm)
                .run(
                    client.as_ref(),
                    &prompt,
                    Some(self.params.max_tokens),
                    &SwarmSinks::arbiter_only(self.sink.clone()),
                )
                .await?
                .text
        } else {
            complete_with_sink(
                client.as_ref(),
                &prompt,
                &self.generation_params(stage),
                self.sink.as_ref(),
            )
            .await?
            .content
        };

        if draft.trim().is_empty() {
            return Err(ForgeError::pipeline(stage, "provider returned an empty design"));
        }

        if !self.params.validation.enabled {
            return Ok(Design {
                content: draft,
                review: Some(DesignReview {
                    outcome: ReviewOutcome::Skipped,
                    iterations: 0,
                    confidence: 0.0,
                    requires_human_review: false,
                    remaining_issues: Vec::new(),
                    changes_applied: 0,
                }),
            });
        }

        let corrector: Arc<dyn Corrector> = match &self.corrector {
            Some(corrector) => corrector.clone(),
            None => Arc::new(LlmCorrector::new(client.clone(), self.renderer.clone())),
        };
        let result = CorrectionLoop::new(self.validator.clone(), corrector)
            .with_max_iterations(self.params.validation.max_iterations)
            .with_confidence_threshold(self.params.validation.confidence_threshold)
            .run(
                &draft,
                &CorrectionContext::new(&inputs.requirements)
                    .with_complexity(inputs.complexity.clone()),
            )
            .await?;

        if result.requires_human_review {
            warn!(
                "Design needs human review ({}): {}",
                result.outcome.as_str(),
                result
                    .validation
                    .issues
                    .iter()
                    .map(|i| i.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        Ok(Design {
            review: Some(result.review()),
            content: result.final_text,
        })
    }

    #[instrument(skip_all)]
    async fn skeleton_stage(&self, inputs: &PipelineInputs, design: &Design) -> Result<PlanSkeleton> {
        let stage = StageKind::PlanSkeleton;
        let client = self.client_for(stage);
        let phase_count = stages::effective_complexity(inputs).estimated_phase_count;
        let context = TemplateContext::new()
            .with("project_name", &inputs.project_name)
            .with("design", &design.content)
            .with("phase_count", phase_count);
        let params = self.generation_params(stage);

        let prompt = self.renderer.render("plan_skeleton", &context)?;
        let response = complete_with_sink(client.as_ref(), &prompt, &params, self.sink.as_ref())
            .await?;
        let skeleton = stages::parse_skeleton(&response.content);
        if !skeleton.phases.is_empty() {
            info!("Plan skeleton has {} phases", skeleton.phases.len());
            return Ok(skeleton);
        }

        warn!("No phase headings in skeleton response, re-prompting");
        let prompt = self.renderer.render("plan_skeleton_strict", &context)?;
        let response = client.complete(&prompt, &params).await?;
        let skeleton = stages::parse_skeleton(&response.content);
        if skeleton.phases.is_empty() {
            return Err(ForgeError::pipeline(
                stage,
                "no phase headings found in the plan skeleton",
            ));
        }
        info!("Plan skeleton has {} phases", skeleton.phases.len());
        Ok(skeleton)
    }

    #[instrument(skip_all, fields(phases = skeleton.phases.len()))]
    async fn detail_stage(
        &self,
        inputs: &PipelineInputs,
        design: &Design,
        skeleton: &PlanSkeleton,
    ) -> Result<DetailedPlan> {
        let stage = StageKind::PlanDetail;
        let mut detailer = PhaseDetailer::new(
            self.client_for(stage).clone(),
            self.renderer.clone(),
            ConcurrencyGate::new(self.params.concurrency),
        )
        .with_params(self.generation_params(stage));
        if self.params.swarm.enabled_for_detail {
            detailer =
                detailer.with_hive(HiveMind::from_config(self.renderer.clone(), &self.params.swarm));
        }

        let context = DetailContext {
            project_name: inputs.project_name.clone(),
            plan_outline: stages::plan_outline(skeleton),
            design_excerpt: stages::design_excerpt(design),
        };
        let phases = detailer
            .detail_all(&skeleton.phases, &context, self.observer.as_ref())
            .await?;
        Ok(DetailedPlan { phases })
    }

    #[instrument(skip_all)]
    async fn handoff_stage(
        &self,
        inputs: &PipelineInputs,
        design: &Design,
        plan: &DetailedPlan,
    ) -> Result<HandoffSummary> {
        let stage = StageKind::Handoff;
        let prompt = self.renderer.render(
            "handoff",
            &TemplateContext::new()
                .with("project_name", &inputs.project_name)
                .with("design", &design.content)
                .with("plan", plan.to_markdown()),
        )?;
        let response = complete_with_sink(
            self.client_for(stage).as_ref(),
            &prompt,
            &self.generation_params(stage),
            self.sink.as_ref(),
        )
        .await?;
        Ok(HandoffSummary {
            content: response.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::testing::ScriptedClient;
    use crate::ai::{ErrorCategory, ProviderConfig, TemplateSet};
    use crate::types::ComplexityProfile;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const DESIGN: &str = "# Todo Service\n\
        ## Overview\nA small todo service.\n\
        ## Architecture\nOne process with a REST API.\n\
        ## Components\nAPI and storage.\n\
        ## Data Model\nA tasks table.\n\
        ## Error Handling\nTyped errors.\n\
        ## Testing\nUnit tests.\n";

    /// Answers every template the pipeline renders
    fn responder(name: &str) -> ScriptedClient {
        ScriptedClient::new(name).with_responder(|prompt, _| {
            if prompt.contains("senior software architect") {
                Ok(DESIGN.to_string())
            } else if prompt.contains("Break the work into") {
                Ok("Phase 1: Setup - repo\nPhase 2: Build".to_string())
            } else if let Some(rest) = prompt.split("\n# Phase ").nth(1) {
                let n: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                Ok(format!("{n}.1: First step\n- detail\n{n}.2: Second step"))
            } else if prompt.contains("handoff summary") {
                Ok("## Goal\nShip it.".to_string())
            } else {
                Ok(String::new())
            }
        })
    }

    fn store(dir: &TempDir) -> SharedCheckpointStore {
        Arc::new(FileCheckpointStore::new(dir.path()))
    }

    fn orchestrator(client: Arc<ScriptedClient>, store: SharedCheckpointStore) -> PipelineOrchestrator {
        PipelineOrchestrator::new(client, store, Arc::new(TemplateSet::builtin()))
    }

    fn inputs() -> PipelineInputs {
        PipelineInputs::new("Todo Service", "Users manage a todo list.")
    }

    #[tokio::test]
    async fn test_run_full_produces_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(responder("mock"));
        let output = orchestrator(client.clone(), store(&dir))
            .run_full(inputs())
            .await
            .unwrap();

        assert!(output.key.starts_with("todo-service--"));
        assert_eq!(output.design.content, DESIGN);
        let review = output.design.review.clone().unwrap();
        assert_eq!(review.outcome, ReviewOutcome::Converged);
        assert_eq!(review.iterations, 1);

        let numbers: Vec<u32> = output.plan.phases.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(output.plan.phases[1].steps[0].number, "2.1");
        assert_eq!(output.plan.phases[0].steps[0].details, vec!["detail"]);
        assert_eq!(output.handoff.content, "## Goal\nShip it.");

        // design, skeleton, two phases, handoff
        assert_eq!(client.call_count(), 5);

        let checkpoints = store(&dir).list().await.unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].key, output.key);
        assert_eq!(checkpoints[0].stage, StageKind::Handoff);
        assert_eq!(checkpoints[0].provider, "mock");
    }

    #[tokio::test]
    async fn test_resume_from_terminal_checkpoint_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        let first = orchestrator(Arc::new(responder("mock")), store(&dir))
            .run_full(inputs())
            .await
            .unwrap();

        let idle = Arc::new(ScriptedClient::new("mock"));
        let mut resumed = orchestrator(idle.clone(), store(&dir));
        let again = resumed.resume_from(&first.key).await.unwrap();
        let twice = resumed.resume_from(&first.key).await.unwrap();

        assert_eq!(again, first);
        assert_eq!(twice, first);
        assert_eq!(idle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_stage_keeps_last_checkpoint_and_resume_finishes() {
        let dir = TempDir::new().unwrap();
        let failing = Arc::new(ScriptedClient::new("mock").with_responder(|prompt, _| {
            if prompt.contains("\n# Phase ") {
                Err(ForgeError::Llm(crate::ai::LlmError::new(
                    ErrorCategory::Network,
                    "connection reset",
                )))
            } else if prompt.contains("senior software architect") {
                Ok(DESIGN.to_string())
            } else {
                Ok("Phase 1: Setup\nPhase 2: Build\nPhase 3: Ship".to_string())
            }
        }));

        let result = orchestrator(failing, store(&dir)).run_full(inputs()).await;
        assert!(result.is_err());

        let saved = store(&dir).list().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].stage, StageKind::PlanSkeleton);

        let client = Arc::new(responder("mock"));
        let output = orchestrator(client.clone(), store(&dir))
            .resume_from(&saved[0].key)
            .await
            .unwrap();

        assert_eq!(output.plan.phases.len(), 3);
        assert_eq!(output.design.content, DESIGN);
        // three phases plus handoff, no design or skeleton calls
        assert_eq!(client.call_count(), 4);
        assert!(
            client
                .calls()
                .iter()
                .all(|c| !c.prompt.contains("senior software architect"))
        );
    }

    #[tokio::test]
    async fn test_resume_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut orchestrator = orchestrator(Arc::new(ScriptedClient::new("mock")), store.clone());

        let missing = orchestrator.resume_from("nope--1").await.unwrap_err();
        assert!(matches!(missing, ForgeError::CheckpointNotFound { .. }));

        // claims plan_detail but carries only a design
        let mut state = PipelineState::new(inputs());
        state.design = Some(Design {
            content: DESIGN.to_string(),
            review: None,
        });
        store
            .save(
                "todo--1",
                StageKind::PlanDetail,
                serde_json::to_value(&state).unwrap(),
                CheckpointMetadata {
                    provider: "mock".to_string(),
                    model: "scripted".to_string(),
                    stage_params: PipelineParams::default(),
                },
            )
            .await
            .unwrap();
        let corrupt = orchestrator.resume_from("todo--1").await.unwrap_err();
        assert!(matches!(corrupt, ForgeError::CheckpointCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_skeleton_strict_reprompt() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(
            ScriptedClient::new("mock")
                .reply(DESIGN)
                .reply("I think we should start soon.")
                .reply("Phase 1: Only phase")
                .with_fallback("1.1: Do it"),
        );
        let output = orchestrator(client.clone(), store(&dir))
            .run_full(inputs())
            .await
            .unwrap();
        assert_eq!(output.plan.phases.len(), 1);
        assert!(client.calls()[2].prompt.contains("Output ONLY lines"));
    }

    #[tokio::test]
    async fn test_skeleton_without_phases_fails_stage() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new("mock").reply(DESIGN).with_fallback("no phases"));
        let err = orchestrator(client, store(&dir))
            .run_full(inputs())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Pipeline {
                stage: StageKind::PlanSkeleton,
                ..
            }
        ));
        let saved = store(&dir).list().await.unwrap();
        assert_eq!(saved[0].stage, StageKind::Design);
    }

    #[test]
    fn test_switch_provider_without_context_fails() {
        let dir = TempDir::new().unwrap();
        let mut orchestrator = orchestrator(Arc::new(ScriptedClient::new("mock")), store(&dir));
        let err = orchestrator.switch_provider("openai").unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
        assert_eq!(orchestrator.provider(), "mock");
    }

    /// Factory producing scripted clients named after the requested provider
    fn scripted_factory(built: Arc<Mutex<Vec<ProviderConfig>>>) -> ClientFactory {
        Arc::new(move |config: &ProviderConfig| {
            built.lock().unwrap().push(config.clone());
            Ok(Arc::new(responder(&config.provider)) as SharedClient)
        })
    }

    #[tokio::test]
    async fn test_switch_provider_keeps_stage_override() {
        let dir = TempDir::new().unwrap();
        let built = Arc::new(Mutex::new(Vec::new()));
        let handoff = Arc::new(responder("handoff-only"));

        let mut orchestrator = orchestrator(Arc::new(responder("mock")), store(&dir))
            .with_provider_context(Config::default(), scripted_factory(built.clone()))
            .with_stage_client(StageKind::Handoff, handoff.clone());

        orchestrator.switch_provider("ollama").unwrap();
        assert_eq!(orchestrator.provider(), "ollama");
        assert_eq!(built.lock().unwrap()[0].provider, "ollama");
        assert_eq!(built.lock().unwrap()[0].model, None);

        orchestrator.run_full(inputs()).await.unwrap();
        assert_eq!(handoff.call_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_switches_to_recorded_provider_and_params() {
        let dir = TempDir::new().unwrap();
        let built = Arc::new(Mutex::new(Vec::new()));

        let mut state = PipelineState::new(
            inputs().with_complexity(ComplexityProfile::default()),
        );
        state.design = Some(Design {
            content: DESIGN.to_string(),
            review: None,
        });
        let mut params = PipelineParams::default();
        params.concurrency = 1;
        store(&dir)
            .save(
                "todo--2",
                StageKind::Design,
                serde_json::to_value(&state).unwrap(),
                CheckpointMetadata {
                    provider: "openai".to_string(),
                    model: "gpt-test".to_string(),
                    stage_params: params,
                },
            )
            .await
            .unwrap();

        let mut orchestrator = orchestrator(Arc::new(responder("claude-code")), store(&dir))
            .with_provider_context(Config::default(), scripted_factory(built.clone()));
        let output = orchestrator.resume_from("todo--2").await.unwrap();

        assert_eq!(orchestrator.provider(), "openai");
        assert_eq!(orchestrator.params().concurrency, 1);
        assert_eq!(built.lock().unwrap()[0].model.as_deref(), Some("gpt-test"));
        assert_eq!(output.plan.phases.len(), 2);

        let saved = store(&dir).load("todo--2").await.unwrap().unwrap();
        assert_eq!(saved.stage, StageKind::Handoff);
        assert_eq!(saved.metadata.provider, "openai");
    }

    #[tokio::test]
    async fn test_validation_disabled_skips_review() {
        let dir = TempDir::new().unwrap();
        let mut params = PipelineParams::default();
        params.validation.enabled = false;
        let output = orchestrator(Arc::new(responder("mock")), store(&dir))
            .with_params(params)
            .run_full(inputs())
            .await
            .unwrap();
        assert_eq!(
            output.design.review.unwrap().outcome,
            ReviewOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_resume_with_provider_override() {
        let dir = TempDir::new().unwrap();
        let first = orchestrator(Arc::new(responder("openai")), store(&dir));
        let mut state = PipelineState::new(inputs());
        state.design = Some(Design {
            content: DESIGN.to_string(),
            review: None,
        });
        store(&dir)
            .save(
                "todo--3",
                StageKind::Design,
                serde_json::to_value(&state).unwrap(),
                CheckpointMetadata {
                    provider: "openai".to_string(),
                    model: "gpt-test".to_string(),
                    stage_params: first.params().clone(),
                },
            )
            .await
            .unwrap();

        let built = Arc::new(Mutex::new(Vec::new()));
        let mut orchestrator = first
            .with_provider_context(Config::default(), scripted_factory(built.clone()));
        orchestrator
            .resume_with_provider("todo--3", "ollama")
            .await
            .unwrap();

        assert_eq!(orchestrator.provider(), "ollama");
        let saved = store(&dir).load("todo--3").await.unwrap().unwrap();
        assert_eq!(saved.metadata.provider, "ollama");
    }

    #[test]
    fn test_state_completed_stage() {
        let mut state = PipelineState::new(inputs());
        assert_eq!(state.completed_stage(), None);
        state.design = Some(Design {
            content: String::new(),
            review: None,
        });
        assert_eq!(state.completed_stage(), Some(StageKind::Design));
        state.skeleton = Some(PlanSkeleton { phases: Vec::new() });
        assert_eq!(state.completed_stage(), Some(StageKind::PlanSkeleton));
    }
}
