//! Claude Code CLI Client
//!
//! Generation client driving the local `claude` CLI in print mode.
//! Single-shot execution only; retries belong to [`super::RetryingClient`].

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{
    GenerationClient, GenerationParams, LlmResponse, ProviderConfig, ResponseMetadata,
    ResponseTiming, TokenUsage,
};
use crate::types::{ErrorCategory, ErrorClassifier, ForgeError, LlmError, Result};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Claude Code CLI client
pub struct ClaudeCodeClient {
    model: String,
    timeout_secs: u64,
    temperature: f32,
}

impl ClaudeCodeClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout_secs: config.timeout_secs,
            temperature: config.temperature,
        }
    }

    async fn execute(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse> {
        let temperature = params.temperature.unwrap_or(self.temperature);
        let start_time = Instant::now();

        debug!(
            "Executing Claude Code CLI (model={}, temperature={})",
            self.model, temperature
        );
        if let Some(max_tokens) = params.max_tokens {
            debug!("Claude Code CLI has no token cap flag, ignoring max_tokens={}", max_tokens);
        }

        let mut cmd = Command::new("claude");
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(&self.model)
            .env("CLAUDE_CODE_TEMPERATURE", temperature.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            ForgeError::Llm(LlmError::with_provider(
                ErrorCategory::Unavailable,
                format!("Failed to spawn Claude Code CLI: {}. Is it installed?", e),
                "claude-code",
            ))
        })?;

        let limit = Duration::from_secs(self.timeout_secs);
        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| ForgeError::timeout("Claude Code CLI", limit))?
            .map_err(|e| {
                ForgeError::Llm(ErrorClassifier::classify(
                    &format!("Claude Code execution failed: {}", e),
                    "claude-code",
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            if let Ok(response) = serde_json::from_str::<Value>(&stdout)
                && response
                    .get("is_error")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            {
                let error_msg = response
                    .get("result")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown API error");
                return Err(ForgeError::Llm(ErrorClassifier::classify(
                    &format!("Claude Code API error: {}", error_msg),
                    "claude-code",
                )));
            }

            let error_msg = if stderr.trim().is_empty() {
                "Process exited with non-zero status"
            } else {
                stderr.as_ref()
            };
            return Err(ForgeError::Llm(ErrorClassifier::classify(
                &format!("Claude Code failed: {}", error_msg),
                "claude-code",
            )));
        }

        let response: Value = serde_json::from_str(&stdout).map_err(|e| {
            ForgeError::Llm(ErrorClassifier::classify(
                &format!("Failed to parse Claude Code output: {}", e),
                "claude-code",
            ))
        })?;

        let content = Self::extract_text(&response)?;

        Ok(LlmResponse {
            content,
            usage: Self::extract_usage(&response),
            cost_usd: Self::extract_cost(&response),
            timing: ResponseTiming {
                total_ms: start_time.elapsed().as_millis() as u64,
                api_ms: response.get("duration_api_ms").and_then(|v| v.as_u64()),
            },
            metadata: ResponseMetadata {
                model: self.model.clone(),
                provider: "claude-code".to_string(),
            },
        })
    }

    fn extract_text(response: &Value) -> Result<String> {
        match response.get("result") {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(ForgeError::llm_with_category(
                ErrorCategory::ParseError,
                "No result in Claude Code response",
            )),
        }
    }

    fn extract_usage(response: &Value) -> TokenUsage {
        let usage = response.get("usage");
        let read = |key: &str| {
            usage
                .and_then(|u| u.get(key))
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32
        };
        TokenUsage::new(read("input_tokens"), read("output_tokens"))
    }

    fn extract_cost(response: &Value) -> f64 {
        response
            .get("total_cost_usd")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl GenerationClient for ClaudeCodeClient {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse> {
        self.execute(prompt, params).await
    }

    fn name(&self) -> &str {
        "claude-code"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let output = Command::new("claude")
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                ForgeError::Llm(LlmError::with_provider(
                    ErrorCategory::Unavailable,
                    format!("Claude Code not found: {}", e),
                    "claude-code",
                ))
            })?;

        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            info!("Claude Code CLI available: {}", version.trim());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires claude CLI installed"]
    async fn test_health_check() {
        let client = ClaudeCodeClient::new(ProviderConfig::default());
        assert!(client.health_check().await.is_ok());
    }

    #[test]
    fn test_extract_text() {
        let response = serde_json::json!({"result": "## Overview\ntext"});
        assert_eq!(
            ClaudeCodeClient::extract_text(&response).unwrap(),
            "## Overview\ntext"
        );
        assert!(ClaudeCodeClient::extract_text(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_extract_usage_and_cost() {
        let response = serde_json::json!({
            "total_cost_usd": 0.0471472,
            "usage": {
                "input_tokens": 1000,
                "output_tokens": 500
            }
        });

        let usage = ClaudeCodeClient::extract_usage(&response);
        assert_eq!(usage.total(), 1500);
        assert!((ClaudeCodeClient::extract_cost(&response) - 0.0471472).abs() < 1e-7);
        assert_eq!(ClaudeCodeClient::extract_cost(&serde_json::json!({})), 0.0);
    }
}
