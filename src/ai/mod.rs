//! AI Integration Layer
//!
//! Generation clients, prompt templates, token streaming and timeouts.

pub mod prompt;
pub mod provider;
pub mod streaming;
pub mod timeout;

pub use prompt::{SharedRenderer, TemplateContext, TemplateRenderer, TemplateSet};
pub use provider::{
    ClaudeCodeClient, ClientFactory, ErrorCategory, ErrorClassifier, GenerationClient,
    GenerationParams, LlmError, LlmResponse, OllamaClient, OpenAiClient, ProviderConfig,
    ResponseMetadata, ResponseTiming, RetryPolicy, RetryingClient, SharedClient, TokenUsage,
    client_factory, create_client,
};
pub use streaming::{SharedSink, TokenSender, TokenSink, complete_with_sink};
pub use timeout::with_timeout;
