//! OpenAI API Client
//!
//! Generation client using OpenAI's Chat Completions API, with SSE streaming.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    GenerationClient, GenerationParams, LlmResponse, ProviderConfig, ResponseMetadata,
    ResponseTiming, TokenSender, TokenUsage,
};
use crate::ai::streaming::LineBuffer;
use crate::types::{ErrorClassifier, ForgeError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const SYSTEM_PROMPT: &str = "You are a senior software architect. Follow the requested output format exactly.";

/// OpenAI API client with secure API key handling
pub struct OpenAiClient {
    /// Never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                ForgeError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var".to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn build_request(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stream: bool,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: params.temperature.unwrap_or(self.temperature),
            max_tokens: Some(params.max_tokens.unwrap_or(self.max_tokens)),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(request)
            .send()
            .await
            .map_err(|e| {
                ForgeError::Llm(ErrorClassifier::classify(
                    &format!("OpenAI request failed: {}", e),
                    "openai",
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Llm(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("OpenAI API error ({}): {}", status, body),
                "openai",
            )));
        }

        Ok(response)
    }

    fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            model: self.model.clone(),
            provider: "openai".to_string(),
        }
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse> {
        let request = self.build_request(prompt, params, false);
        debug!(
            "OpenAI completion (model: {}, temperature: {})",
            self.model, request.temperature
        );

        let start_time = Instant::now();
        let response = self.send(&request).await?;

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            ForgeError::Llm(ErrorClassifier::classify(
                &format!("Failed to parse OpenAI response: {}", e),
                "openai",
            ))
        })?;

        let usage = body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ForgeError::llm_with_category(
                    crate::types::ErrorCategory::ParseError,
                    "No content in OpenAI response",
                )
            })?;

        Ok(LlmResponse {
            content,
            usage,
            cost_usd: 0.0,
            timing: ResponseTiming::from_duration(start_time.elapsed()),
            metadata: self.metadata(),
        })
    }

    async fn complete_streaming(
        &self,
        prompt: &str,
        params: &GenerationParams,
        tokens: TokenSender,
    ) -> Result<LlmResponse> {
        let request = self.build_request(prompt, params, true);
        debug!(
            "OpenAI streaming completion (model: {}, temperature: {})",
            self.model, request.temperature
        );

        let start_time = Instant::now();
        let response = self.send(&request).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut content = String::new();
        let mut usage = TokenUsage::default();
        let mut finished = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ForgeError::Llm(ErrorClassifier::classify(
                    &format!("OpenAI stream interrupted: {}", e),
                    "openai",
                ))
            })?;
            lines.push(&chunk);

            while let Some(line) = lines.next_line() {
                match parse_sse_line(&line) {
                    SseEvent::Delta(text) => {
                        content.push_str(&text);
                        if tokens.send(text).await.is_err() {
                            debug!("Token consumer dropped, continuing without forwarding");
                        }
                    }
                    SseEvent::Usage(u) => usage = u,
                    SseEvent::Done => finished = true,
                    SseEvent::Skip => {}
                }
            }
            if finished {
                break;
            }
        }

        if !finished {
            warn!("OpenAI stream ended without [DONE] marker");
        }

        Ok(LlmResponse {
            content,
            usage,
            cost_usd: 0.0,
            timing: ResponseTiming::from_duration(start_time.elapsed()),
            metadata: self.metadata(),
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("OpenAI API is available");
                Ok(true)
            }
            Ok(resp) => {
                warn!("OpenAI API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("OpenAI API check failed: {}", e);
                Ok(false)
            }
        }
    }
}

// =============================================================================
// Server-Sent Events
// =============================================================================

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Usage(TokenUsage),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        debug!("Skipping unparseable SSE payload");
        return SseEvent::Skip;
    };

    if let Some(text) = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        && !text.is_empty()
    {
        return SseEvent::Delta(text);
    }

    match chunk.usage {
        Some(u) => SseEvent::Usage(TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        None => SseEvent::Skip,
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(ProviderConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            api_base: Some("https://example.invalid/v1/".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_honours_overrides() {
        let client = client();
        assert_eq!(client.api_base, "https://example.invalid/v1");

        let params = GenerationParams::default().temperature(0.2).max_tokens(512);
        let request = client.build_request("hi", &params, true);
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, Some(512));
        assert!(request.stream_options.is_some());

        let request = client.build_request("hi", &GenerationParams::default(), false);
        assert_eq!(request.temperature, client.temperature);
        assert_eq!(request.max_tokens, Some(client.max_tokens));
        assert!(request.stream_options.is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("sk-test"));
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseEvent::Delta("Hel".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(
            parse_sse_line(
                r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":4}}"#
            ),
            SseEvent::Usage(TokenUsage::new(10, 4))
        );
    }
}
