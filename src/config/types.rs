//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/planforge/) and project (.planforge/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ai::provider::ProviderConfig;
use crate::constants::{checkpoint, correction, llm, swarm};
use crate::types::{ForgeError, Result, StageKind};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Default generation provider
    pub llm: LlmConfig,

    /// Per-stage provider overrides
    pub stages: StagesConfig,

    /// Fan-out, swarm, validation and retry settings
    pub pipeline: PipelineConfig,

    /// Checkpoint persistence
    pub checkpoint: CheckpointConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            stages: StagesConfig::default(),
            pipeline: PipelineConfig::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        check_temperature("llm.temperature", self.llm.temperature)?;
        check_temperature("pipeline.swarm.temperature", self.pipeline.swarm.temperature)?;
        for (stage, stage_override) in self.stages.iter() {
            if let Some(t) = stage_override.temperature {
                check_temperature(&format!("stages.{}.temperature", stage), t)?;
            }
        }

        if self.llm.timeout_secs == 0 {
            return Err(ForgeError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(ForgeError::Config(
                "LLM max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.concurrency == 0 {
            return Err(ForgeError::Config(
                "pipeline.concurrency must be greater than 0".to_string(),
            ));
        }

        if !(1..=swarm::MAX_DRONES).contains(&self.pipeline.swarm.drones) {
            return Err(ForgeError::Config(format!(
                "pipeline.swarm.drones must be between 1 and {}, got {}",
                swarm::MAX_DRONES,
                self.pipeline.swarm.drones
            )));
        }

        if self.pipeline.validation.max_iterations == 0 {
            return Err(ForgeError::Config(
                "pipeline.validation.max_iterations must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.pipeline.validation.confidence_threshold) {
            return Err(ForgeError::Config(format!(
                "pipeline.validation.confidence_threshold must be between 0.0 and 1.0, got {}",
                self.pipeline.validation.confidence_threshold
            )));
        }

        Ok(())
    }

    /// Provider configuration for the default client
    pub fn provider_config(&self) -> ProviderConfig {
        self.llm.to_provider_config()
    }

    /// Provider configuration for a stage, `None` when the stage has no override
    pub fn stage_provider_config(&self, stage: StageKind) -> Option<ProviderConfig> {
        let stage_override = self.stages.for_stage(stage)?;
        if stage_override.is_empty() {
            return None;
        }

        let mut config = self.llm.to_provider_config();
        if let Some(provider) = &stage_override.provider {
            config.provider = provider.clone();
            // A different provider rarely understands the default model name
            config.model = None;
        }
        if let Some(model) = &stage_override.model {
            config.model = Some(model.clone());
        }
        if let Some(temperature) = stage_override.temperature {
            config.temperature = temperature;
        }
        Some(config)
    }
}

fn check_temperature(field: &str, value: f32) -> Result<()> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ForgeError::Config(format!(
            "{} must be between 0.0 and 2.0, got {}",
            field, value
        )));
    }
    Ok(())
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "claude-code", "openai", "ollama"
    pub provider: String,

    /// Model name, provider default when empty
    pub model: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Base temperature for stage calls
    pub temperature: f32,

    /// Maximum tokens to generate per call
    pub max_tokens: usize,

    /// Custom API endpoint
    pub api_base: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "claude-code".to_string(),
            model: None,
            timeout_secs: llm::DEFAULT_TIMEOUT_SECS,
            temperature: llm::DEFAULT_TEMPERATURE,
            max_tokens: llm::DEFAULT_MAX_TOKENS,
            api_base: None,
        }
    }
}

impl LlmConfig {
    /// API keys come from the environment only, never from config files
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout_secs,
            temperature: self.temperature,
            api_key: None,
            api_base: self.api_base.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

// =============================================================================
// Stage Overrides
// =============================================================================

/// Provider override for one stage; unset fields inherit from `[llm]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOverride {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl StageOverride {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.model.is_none() && self.temperature.is_none()
    }
}

/// Design, plan (skeleton and detail) and handoff can each use their own provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub design: Option<StageOverride>,
    pub plan: Option<StageOverride>,
    pub handoff: Option<StageOverride>,
}

impl StagesConfig {
    pub fn for_stage(&self, stage: StageKind) -> Option<&StageOverride> {
        match stage {
            StageKind::Design => self.design.as_ref(),
            StageKind::PlanSkeleton | StageKind::PlanDetail => self.plan.as_ref(),
            StageKind::Handoff => self.handoff.as_ref(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &StageOverride)> {
        [
            ("design", self.design.as_ref()),
            ("plan", self.plan.as_ref()),
            ("handoff", self.handoff.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, o)| o.map(|o| (name, o)))
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent generation calls during plan detailing
    pub concurrency: usize,

    pub swarm: SwarmConfig,

    pub validation: ValidationConfig,

    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: crate::constants::gate::DEFAULT_CONCURRENCY,
            swarm: SwarmConfig::default(),
            validation: ValidationConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Route the design stage through the swarm
    pub enabled_for_design: bool,

    /// Route per-phase detailing through the swarm
    pub enabled_for_detail: bool,

    /// Number of drone completions per swarm call
    pub drones: usize,

    /// Base drone temperature
    pub temperature: f32,

    /// Spread drone temperatures around the base
    pub jitter: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            enabled_for_design: false,
            enabled_for_detail: false,
            drones: swarm::DEFAULT_DRONES,
            temperature: swarm::DEFAULT_TEMPERATURE,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Run the validate-correct loop on the design
    pub enabled: bool,

    pub max_iterations: u32,

    /// Confidence a valid design must exceed to converge
    pub confidence_threshold: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: correction::MAX_ITERATIONS,
            confidence_threshold: correction::CONFIDENCE_THRESHOLD,
        }
    }
}

/// Opt-in retry policy wrapped around every generation client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_secs: 60,
        }
    }
}

// =============================================================================
// Checkpoint Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// One JSON file per checkpoint
    #[default]
    File,
    /// `checkpoints` table in the project database
    Sqlite,
}

impl std::fmt::Display for CheckpointBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointBackend::File => write!(f, "file"),
            CheckpointBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,

    /// Directory for the file backend
    pub dir: PathBuf,

    /// Database path for the sqlite backend
    pub database: PathBuf,

    /// Snapshots kept per project by `checkpoints prune`
    pub keep_latest: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::File,
            dir: PathBuf::from(checkpoint::DEFAULT_DIR),
            database: PathBuf::from(checkpoint::DEFAULT_DATABASE),
            keep_latest: checkpoint::DEFAULT_KEEP_LATEST,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
