//! Generation Client Abstraction
//!
//! Defines the [`GenerationClient`] trait every stage calls through. Clients
//! return plain text plus usage metrics, honour per-call temperature and
//! token overrides, and can stream tokens into a channel.
//!
//! ## Modules
//!
//! - `retry`: classified exponential backoff around any client

mod claude_code;
mod ollama;
mod openai;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use claude_code::ClaudeCodeClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use retry::{RetryPolicy, RetryingClient};

pub use crate::ai::streaming::TokenSender;
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{ForgeError, Result};

// =============================================================================
// Call Parameters
// =============================================================================

/// Per-call overrides; unset fields fall back to the client's configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl GenerationParams {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

// =============================================================================
// LLM Response with Usage Metrics
// =============================================================================

/// Complete generation response including text and usage metrics
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text
    pub content: String,
    pub usage: TokenUsage,
    /// Actual cost in USD when the provider reports it
    pub cost_usd: f64,
    pub timing: ResponseTiming,
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with content only (usage/cost unknown)
    pub fn content_only(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Token usage metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Wall clock time in milliseconds
    pub total_ms: u64,
    /// Provider-reported processing time
    pub api_ms: Option<u64>,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
            api_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub model: String,
    pub provider: String,
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for generation providers
///
/// API keys are never serialized and are redacted in debug output. Each
/// client converts the key to `SecretString` internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "claude-code", "openai", "ollama"
    pub provider: String,
    /// Model name (provider-specific)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Default temperature when a call does not override it
    pub temperature: f32,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Default token budget when a call does not override it
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_max_tokens() -> usize {
    crate::constants::llm::DEFAULT_MAX_TOKENS
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "claude-code".to_string(),
            model: None,
            timeout_secs: crate::constants::llm::DEFAULT_TIMEOUT_SECS,
            temperature: crate::constants::llm::DEFAULT_TEMPERATURE,
            api_key: None,
            api_base: None,
            max_tokens: default_max_tokens(),
        }
    }
}

// =============================================================================
// Generation Client Trait
// =============================================================================

/// Text generation backend
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for `prompt`
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse>;

    /// Generate a completion, pushing tokens into `tokens` as they arrive.
    ///
    /// Dropping `tokens` (returning) signals completion to the consumer.
    /// The default sends the whole text as a single token.
    async fn complete_streaming(
        &self,
        prompt: &str,
        params: &GenerationParams,
        tokens: TokenSender,
    ) -> Result<LlmResponse> {
        let response = self.complete(prompt, params).await?;
        // A consumer that went away is not a generation failure
        let _ = tokens.send(response.content.clone()).await;
        Ok(response)
    }

    /// Provider name for logging and checkpoint metadata
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;
}

/// Shared client type for concurrent access across pipeline stages.
pub type SharedClient = Arc<dyn GenerationClient>;

/// Builds clients from provider configuration; swapped out in tests
pub type ClientFactory = Arc<dyn Fn(&ProviderConfig) -> Result<SharedClient> + Send + Sync>;

/// Create a shared client from configuration
pub fn create_client(config: &ProviderConfig) -> Result<SharedClient> {
    match config.provider.as_str() {
        "claude-code" => Ok(Arc::new(ClaudeCodeClient::new(config.clone()))),
        "openai" => Ok(Arc::new(OpenAiClient::new(config.clone())?)),
        "ollama" => Ok(Arc::new(OllamaClient::new(config.clone())?)),
        _ => Err(ForgeError::Config(format!(
            "Unknown provider: {}. Supported: claude-code, openai, ollama",
            config.provider
        ))),
    }
}

/// Factory producing real clients, wrapped in the retry policy when one is given
pub fn client_factory(retry: Option<RetryPolicy>) -> ClientFactory {
    Arc::new(move |config: &ProviderConfig| {
        let client = create_client(config)?;
        Ok(match retry.clone() {
            Some(policy) => Arc::new(RetryingClient::new(client, policy)) as SharedClient,
            None => client,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider() {
        let config = ProviderConfig {
            provider: "gemini".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_client(&config), Err(ForgeError::Config(_))));
    }

    #[test]
    fn test_provider_config_debug_redacts_key() {
        let config = ProviderConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_params_builder() {
        let params = GenerationParams::default().temperature(0.2).max_tokens(512);
        assert_eq!(params.temperature, Some(0.2));
        assert_eq!(params.max_tokens, Some(512));
    }

    #[tokio::test]
    async fn test_factory_builds_claude_code() {
        let factory = client_factory(Some(RetryPolicy::default()));
        let client = factory(&ProviderConfig::default()).unwrap();
        assert_eq!(client.name(), "claude-code");
    }
}
