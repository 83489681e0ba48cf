//! CLI Common Utilities
//!
//! Shared setup for command handlers: config loading, checkpoint store,
//! client factory and template resolution.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::ai::{ClientFactory, RetryPolicy, SharedRenderer, TemplateSet, client_factory};
use crate::config::{Config, ConfigLoader};
use crate::pipeline::{PipelineOrchestrator, SharedCheckpointStore, open_store};
use crate::types::{ComplexityProfile, DepthLevel, ForgeError, Result, ResultExt};

/// Prompt overrides inside the project directory
pub const PROMPTS_DIR: &str = "prompts";

/// Command execution context
#[derive(Clone)]
pub struct CommandContext {
    /// Project data directory (.planforge)
    pub project_dir: PathBuf,
    pub config: Config,
    pub store: SharedCheckpointStore,
}

impl CommandContext {
    /// Validates initialization, loads config and opens the checkpoint store
    pub fn load() -> Result<Self> {
        let project_dir = require_initialized()?;
        let config = ConfigLoader::load()?;
        Self::with_config(project_dir, config)
    }

    pub fn with_config(project_dir: PathBuf, config: Config) -> Result<Self> {
        let store = open_store(&config.checkpoint)?;
        Ok(Self {
            project_dir,
            config,
            store,
        })
    }

    /// Built-in templates plus any overrides in `.planforge/prompts`
    pub fn renderer(&self) -> Result<SharedRenderer> {
        let overrides = self.project_dir.join(PROMPTS_DIR);
        let templates = if overrides.is_dir() {
            debug!("Loading prompt overrides from {}", overrides.display());
            TemplateSet::builtin().with_overrides_from(&overrides)?
        } else {
            TemplateSet::builtin()
        };
        Ok(Arc::new(templates))
    }

    /// Real provider clients, wrapped in retries when enabled
    pub fn factory(&self) -> ClientFactory {
        client_factory(retry_policy(&self.config))
    }

    pub fn orchestrator(&self) -> Result<PipelineOrchestrator> {
        PipelineOrchestrator::from_config(
            &self.config,
            self.factory(),
            self.store.clone(),
            self.renderer()?,
        )
    }
}

/// Retry policy from `[pipeline.retry]`, `None` when disabled
pub fn retry_policy(config: &Config) -> Option<RetryPolicy> {
    let retry = &config.pipeline.retry;
    retry.enabled.then(|| {
        RetryPolicy::from_config(retry)
            .with_attempt_timeout(Duration::from_secs(config.llm.timeout_secs))
    })
}

/// Require `planforge init` to have run in the current directory
pub fn require_initialized() -> Result<PathBuf> {
    let project_dir = ConfigLoader::project_dir();
    if !project_dir.exists() {
        return Err(ForgeError::Config(
            "Not initialized. Run 'planforge init' first.".to_string(),
        ));
    }
    Ok(project_dir)
}

pub fn is_initialized() -> bool {
    ConfigLoader::project_dir().exists()
}

/// Read requirements from a file, or stdin when the path is `-`
pub fn read_requirements(source: &Path) -> Result<String> {
    let text = if source == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .with_context("Failed to read requirements from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context_fn(|| format!("Failed to read {}", source.display()))?
    };

    if text.trim().is_empty() {
        return Err(ForgeError::Config("Requirements are empty".to_string()));
    }
    Ok(text)
}

/// Complexity profile from a 1-10 score given on the command line
pub fn complexity_from_score(score: u8, phases: Option<u32>) -> Result<ComplexityProfile> {
    if !(1..=10).contains(&score) {
        return Err(ForgeError::Config(format!(
            "complexity must be between 1 and 10 (got {})",
            score
        )));
    }
    let depth_level = match score {
        1..=3 => DepthLevel::Minimal,
        4..=6 => DepthLevel::Standard,
        7..=8 => DepthLevel::Detailed,
        _ => DepthLevel::Comprehensive,
    };
    Ok(ComplexityProfile {
        score,
        estimated_phase_count: phases.unwrap_or(2 + u32::from(score) / 2),
        depth_level,
        confidence: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_requirements_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("req.md");
        std::fs::write(&path, "Build a todo app").unwrap();
        assert_eq!(read_requirements(&path).unwrap(), "Build a todo app");

        std::fs::write(&path, "  \n").unwrap();
        assert!(read_requirements(&path).is_err());
        assert!(read_requirements(&dir.path().join("missing.md")).is_err());
    }

    #[test]
    fn test_complexity_from_score() {
        let simple = complexity_from_score(2, None).unwrap();
        assert_eq!(simple.depth_level, DepthLevel::Minimal);
        assert_eq!(simple.estimated_phase_count, 3);

        let large = complexity_from_score(9, Some(8)).unwrap();
        assert_eq!(large.depth_level, DepthLevel::Comprehensive);
        assert_eq!(large.estimated_phase_count, 8);

        assert!(complexity_from_score(0, None).is_err());
        assert!(complexity_from_score(11, None).is_err());
    }

    #[test]
    fn test_retry_policy_follows_config() {
        let mut config = Config::default();
        config.pipeline.retry.enabled = false;
        assert!(retry_policy(&config).is_none());

        config.pipeline.retry.enabled = true;
        config.pipeline.retry.max_retries = 4;
        assert_eq!(retry_policy(&config).unwrap().max_retries, 4);
    }

    #[test]
    fn test_context_with_file_store() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.checkpoint.dir = dir.path().join("checkpoints");
        let context = CommandContext::with_config(dir.path().to_path_buf(), config).unwrap();
        assert!(context.renderer().is_ok());
        assert!(context.orchestrator().is_ok());
    }
}
