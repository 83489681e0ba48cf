//! Call parameters recorded with every checkpoint

use serde::{Deserialize, Serialize};

use crate::ai::GenerationParams;
use crate::config::{Config, SwarmConfig, ValidationConfig};
use crate::constants::{gate, llm};

/// Parameters a run was started with; a resumed run reuses them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub temperature: f32,
    pub max_tokens: usize,
    pub concurrency: usize,
    pub swarm: SwarmConfig,
    pub validation: ValidationConfig,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            temperature: llm::DEFAULT_TEMPERATURE,
            max_tokens: llm::DEFAULT_MAX_TOKENS,
            concurrency: gate::DEFAULT_CONCURRENCY,
            swarm: SwarmConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl From<&Config> for PipelineParams {
    fn from(config: &Config) -> Self {
        Self {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            concurrency: config.pipeline.concurrency,
            swarm: config.pipeline.swarm.clone(),
            validation: config.pipeline.validation.clone(),
        }
    }
}

impl PipelineParams {
    /// Per-call parameters for ordinary stage calls
    pub fn generation(&self) -> GenerationParams {
        GenerationParams::default()
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.llm.temperature = 0.9;
        config.pipeline.concurrency = 7;
        config.pipeline.swarm.drones = 5;

        let params = PipelineParams::from(&config);
        assert_eq!(params.temperature, 0.9);
        assert_eq!(params.concurrency, 7);
        assert_eq!(params.swarm.drones, 5);
        assert_eq!(params.generation().temperature, Some(0.9));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let params: PipelineParams = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
        assert_eq!(params.concurrency, 2);
        assert_eq!(params.max_tokens, llm::DEFAULT_MAX_TOKENS);
    }
}
