//! Scripted client for tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationClient, GenerationParams, LlmResponse, TokenSender};
use crate::types::{ErrorCategory, ForgeError, LlmError, Result};

type Responder = Box<dyn Fn(&str, &GenerationParams) -> Result<String> + Send + Sync>;

enum Reply {
    Text(String),
    Fail(ErrorCategory),
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub prompt: String,
    pub params: GenerationParams,
}

/// Replays queued replies in order, then falls back to a responder or a fixed text
pub(crate) struct ScriptedClient {
    name: String,
    queue: Mutex<VecDeque<Reply>>,
    responder: Option<Responder>,
    fallback: String,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            fallback: String::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(Reply::Text(text.to_string()));
        self
    }

    pub fn fail(self, category: ErrorCategory) -> Self {
        self.queue.lock().unwrap().push_back(Reply::Fail(category));
        self
    }

    /// Computes replies once the queue is drained
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &GenerationParams) -> Result<String> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = text.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls observed in flight at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_reply(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let queued = self.queue.lock().unwrap().pop_front();
        match queued {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(category)) => Err(ForgeError::Llm(LlmError::with_provider(
                category,
                format!("scripted {} failure", category),
                self.name.clone(),
            ))),
            None => match &self.responder {
                Some(responder) => responder(prompt, params),
                None => Ok(self.fallback.clone()),
            },
        }
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<LlmResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_string(),
            params: *params,
        });

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.next_reply(prompt, params);
        self.active.fetch_sub(1, Ordering::SeqCst);

        let mut response = LlmResponse::content_only(reply?);
        response.metadata.provider = self.name.clone();
        response.metadata.model = "scripted".to_string();
        Ok(response)
    }

    async fn complete_streaming(
        &self,
        prompt: &str,
        params: &GenerationParams,
        tokens: TokenSender,
    ) -> Result<LlmResponse> {
        let response = self.complete(prompt, params).await?;
        for piece in response.content.split_inclusive(' ') {
            let _ = tokens.send(piece.to_string()).await;
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
