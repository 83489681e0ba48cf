//! Retrying Client
//!
//! Opt-in retry policy around any [`GenerationClient`]. Failures are
//! classified with [`ErrorClassifier`]; only retryable categories are
//! attempted again, with exponential backoff plus random jitter.
//!
//! Streaming calls are retried only while no token has reached the
//! consumer, so a consumer never sees a partial answer followed by a
//! second full one.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::{GenerationClient, GenerationParams, LlmResponse, SharedClient, TokenSender};
use crate::ai::timeout::with_timeout;
use crate::config::RetryConfig;
use crate::constants::{llm, retry as retry_constants};
use crate::types::{ErrorCategory, ErrorClassifier, Result};

/// Caller-supplied retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f32,
    /// Per-attempt timeout, `None` leaves it to the client
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_secs),
            backoff_factor: retry_constants::BACKOFF_FACTOR,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Delay before the next attempt, `None` when the failure is final
    fn next_delay(
        &self,
        category: ErrorCategory,
        hint: Duration,
        attempt: u32,
        current: Duration,
    ) -> Option<Duration> {
        if attempt >= self.max_retries || !category.is_retryable() {
            return None;
        }
        let delay = match category {
            // Honour the provider's hint over our own schedule
            ErrorCategory::RateLimit => hint.max(current),
            _ => current + random_jitter(current),
        };
        Some(delay.min(self.max_delay))
    }
}

/// Client wrapper applying a [`RetryPolicy`]
pub struct RetryingClient {
    inner: SharedClient,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: SharedClient, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse> {
        match self.policy.attempt_timeout {
            Some(limit) => with_timeout(limit, self.inner.complete(prompt, params), "completion").await,
            None => self.inner.complete(prompt, params).await,
        }
    }

    /// One streaming attempt; returns how many tokens reached the consumer
    async fn attempt_streaming(
        &self,
        prompt: &str,
        params: &GenerationParams,
        tokens: &TokenSender,
    ) -> (Result<LlmResponse>, usize) {
        let (tx, mut rx) = mpsc::channel::<String>(llm::STREAM_CHANNEL_CAPACITY);

        let producer = async {
            match self.policy.attempt_timeout {
                Some(limit) => {
                    with_timeout(
                        limit,
                        self.inner.complete_streaming(prompt, params, tx),
                        "streaming completion",
                    )
                    .await
                }
                None => self.inner.complete_streaming(prompt, params, tx).await,
            }
        };
        let forwarder = async {
            let mut forwarded = 0usize;
            while let Some(token) = rx.recv().await {
                forwarded += 1;
                if tokens.send(token).await.is_err() {
                    debug!("Token consumer dropped during retrying stream");
                }
            }
            forwarded
        };

        tokio::join!(producer, forwarder)
    }
}

#[async_trait]
impl GenerationClient for RetryingClient {
    #[instrument(skip(self, prompt, params), fields(provider = %self.inner.name()))]
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse> {
        let mut current_delay = self.policy.base_delay;
        let mut attempt = 0u32;

        loop {
            match self.attempt(prompt, params).await {
                Ok(response) => {
                    if attempt > 0 {
                        debug!(attempt, "Completion succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(err) => {
                    let classified = ErrorClassifier::classify_error(&err, self.inner.name());
                    let Some(delay) = self.policy.next_delay(
                        classified.category,
                        classified.recommended_delay(),
                        attempt,
                        current_delay,
                    ) else {
                        return Err(err);
                    };

                    warn!(
                        category = %classified.category,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Completion failed, retrying: {}",
                        classified.message
                    );
                    sleep(delay).await;
                    current_delay = calculate_backoff(
                        current_delay,
                        self.policy.backoff_factor,
                        self.policy.max_delay,
                    );
                    attempt += 1;
                }
            }
        }
    }

    #[instrument(skip(self, prompt, params, tokens), fields(provider = %self.inner.name()))]
    async fn complete_streaming(
        &self,
        prompt: &str,
        params: &GenerationParams,
        tokens: TokenSender,
    ) -> Result<LlmResponse> {
        let mut current_delay = self.policy.base_delay;
        let mut attempt = 0u32;

        loop {
            let (result, forwarded) = self.attempt_streaming(prompt, params, &tokens).await;
            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if forwarded > 0 {
                warn!(forwarded, "Stream failed after tokens were delivered, not retrying");
                return Err(err);
            }

            let classified = ErrorClassifier::classify_error(&err, self.inner.name());
            let Some(delay) = self.policy.next_delay(
                classified.category,
                classified.recommended_delay(),
                attempt,
                current_delay,
            ) else {
                return Err(err);
            };

            warn!(
                category = %classified.category,
                attempt = attempt + 1,
                "Streaming completion failed before first token, retrying"
            );
            sleep(delay).await;
            current_delay = calculate_backoff(
                current_delay,
                self.policy.backoff_factor,
                self.policy.max_delay,
            );
            attempt += 1;
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }
}

/// Random jitter up to a quarter of the base delay
fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms =
        (base_delay.as_millis() as f64 * retry_constants::JITTER_RATIO) as u64;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    let jitter_ms = rand::rng().random_range(0..max_jitter_ms);
    Duration::from_millis(jitter_ms)
}

/// Exponential backoff with cap
fn calculate_backoff(current: Duration, factor: f32, max: Duration) -> Duration {
    let next = Duration::from_secs_f32(current.as_secs_f32() * factor);
    std::cmp::min(next, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::testing::ScriptedClient;
    use std::sync::Arc;
    use crate::types::ForgeError;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            attempt_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let inner = Arc::new(
            ScriptedClient::new("mock")
                .fail(ErrorCategory::Transient)
                .fail(ErrorCategory::RateLimit)
                .reply("ok"),
        );
        let client = RetryingClient::new(inner.clone(), fast_policy(3));

        let response = client
            .complete("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_auth() {
        let inner = Arc::new(ScriptedClient::new("mock").fail(ErrorCategory::Auth).reply("ok"));
        let client = RetryingClient::new(inner.clone(), fast_policy(3));

        let err = client
            .complete("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Llm(ref e) if e.category == ErrorCategory::Auth));
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(
            ScriptedClient::new("mock")
                .fail(ErrorCategory::Network)
                .fail(ErrorCategory::Network)
                .fail(ErrorCategory::Network),
        );
        let client = RetryingClient::new(inner.clone(), fast_policy(1));

        assert!(
            client
                .complete("prompt", &GenerationParams::default())
                .await
                .is_err()
        );
        assert_eq!(inner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_streaming_retries_before_first_token() {
        let inner = Arc::new(
            ScriptedClient::new("mock")
                .fail(ErrorCategory::Transient)
                .reply("hello streaming world"),
        );
        let client = RetryingClient::new(inner.clone(), fast_policy(2));
        let (tx, mut rx) = mpsc::channel(16);

        let response = client
            .complete_streaming("prompt", &GenerationParams::default(), tx)
            .await
            .unwrap();

        let mut received = String::new();
        while let Some(token) = rx.recv().await {
            received.push_str(&token);
        }
        assert_eq!(received, "hello streaming world");
        assert_eq!(response.content, received);
        assert_eq!(inner.call_count(), 2);
    }

    #[test]
    fn test_backoff_is_capped() {
        let next = calculate_backoff(Duration::from_secs(40), 2.0, Duration::from_secs(60));
        assert_eq!(next, Duration::from_secs(60));
        assert!(random_jitter(Duration::from_millis(400)) < Duration::from_millis(100));
    }

    #[test]
    fn test_rate_limit_delay_uses_hint_within_cap() {
        let policy = fast_policy(3);
        let delay = policy
            .next_delay(
                ErrorCategory::RateLimit,
                Duration::from_secs(30),
                0,
                policy.base_delay,
            )
            .unwrap();
        assert_eq!(delay, policy.max_delay);
        assert!(
            policy
                .next_delay(ErrorCategory::BadRequest, Duration::ZERO, 0, policy.base_delay)
                .is_none()
        );
    }
}
