//! Ollama Local Client
//!
//! Generation client for locally-running Ollama models. Streaming uses the
//! newline-delimited JSON form of `/api/generate`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    GenerationClient, GenerationParams, LlmResponse, ProviderConfig, ResponseMetadata,
    ResponseTiming, TokenSender, TokenUsage,
};
use crate::ai::streaming::LineBuffer;
use crate::types::{ErrorClassifier, ForgeError, Result};

const DEFAULT_API_BASE: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3:latest";

/// Ollama local client
pub struct OllamaClient {
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let api_base = Self::validate_endpoint(&api_base)?;

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    /// Validate endpoint URL (SSRF prevention)
    ///
    /// Only allows http/https schemes and warns for non-localhost endpoints.
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            ForgeError::Config(format!("Invalid Ollama endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ForgeError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "[::1]")
        {
            warn!(
                "Ollama endpoint is not localhost: {}. Ensure this is intentional.",
                host
            );
        }

        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn build_request(&self, prompt: &str, params: &GenerationParams, stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream,
            options: OllamaOptions {
                temperature: params.temperature.unwrap_or(self.temperature),
                num_predict: params.max_tokens.unwrap_or(self.max_tokens),
            },
        }
    }

    async fn send(&self, request: &OllamaRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.api_base);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_connect() {
                    format!(
                        "Connection to Ollama at {} failed. Is Ollama running? Start with: ollama serve",
                        self.api_base
                    )
                } else {
                    format!("Ollama request failed: {}", e)
                };
                ForgeError::Llm(ErrorClassifier::classify(&message, "ollama"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Llm(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("Ollama API error ({}): {}", status, body),
                "ollama",
            )));
        }

        Ok(response)
    }

    fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            model: self.model.clone(),
            provider: "ollama".to_string(),
        }
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse> {
        let request = self.build_request(prompt, params, false);
        debug!(
            "Ollama completion (model: {}, temperature: {})",
            self.model, request.options.temperature
        );

        let start_time = Instant::now();
        let response = self.send(&request).await?;

        let body: OllamaChunk = response.json().await.map_err(|e| {
            ForgeError::Llm(ErrorClassifier::classify(
                &format!("Failed to parse Ollama response: {}", e),
                "ollama",
            ))
        })?;

        Ok(LlmResponse {
            usage: body.usage(),
            content: body.response,
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
            "Ollama streaming completion (model: {}, temperature: {})",
            self.model, request.options.temperature
        );

        let start_time = Instant::now();
        let response = self.send(&request).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut content = String::new();
        let mut usage = TokenUsage::default();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ForgeError::Llm(ErrorClassifier::classify(
                    &format!("Ollama stream interrupted: {}", e),
                    "ollama",
                ))
            })?;
            lines.push(&chunk);

            while let Some(line) = lines.next_line() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Ok(piece) = serde_json::from_str::<OllamaChunk>(line) else {
                    debug!("Skipping unparseable Ollama stream line");
                    continue;
                };
                if !piece.response.is_empty() {
                    content.push_str(&piece.response);
                    if tokens.send(piece.response.clone()).await.is_err() {
                        debug!("Token consumer dropped, continuing without forwarding");
                    }
                }
                if piece.done {
                    usage = piece.usage();
                    break 'outer;
                }
            }
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
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.api_base);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(tags) = resp.json::<OllamaTagsResponse>().await {
                    let model_available = tags.models.iter().any(|m| {
                        m.name == self.model
                            || m.name.starts_with(&self.model.replace(":latest", ""))
                    });

                    if model_available {
                        info!("Ollama is available with model: {}", self.model);
                        Ok(true)
                    } else {
                        warn!(
                            "Ollama is running but model '{}' not found. Pull with: ollama pull {}",
                            self.model, self.model
                        );
                        Ok(false)
                    }
                } else {
                    info!("Ollama is available");
                    Ok(true)
                }
            }
            Ok(resp) => {
                warn!("Ollama API check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Ollama not available: {}. Start with: ollama serve", e);
                Ok(false)
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

/// Full response or one streamed line; both share this shape
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaChunk {
    fn usage(&self) -> TokenUsage {
        TokenUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}
