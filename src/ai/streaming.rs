//! Token Streaming
//!
//! Providers push tokens into a bounded channel while a consumer drains it
//! into a [`TokenSink`]. The producer dropping its sender closes the channel,
//! which is the completion signal; `on_completion` fires once afterwards
//! with the full text.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::ai::provider::{GenerationClient, GenerationParams, LlmResponse};
use crate::constants::llm::STREAM_CHANNEL_CAPACITY;
use crate::types::Result;

/// Sending half handed to streaming providers
pub type TokenSender = mpsc::Sender<String>;

/// Receives streamed tokens for one completion
pub trait TokenSink: Send + Sync {
    fn on_token(&self, token: &str);

    /// Called once with the full text after the last token
    fn on_completion(&self, _text: &str) {}
}

pub type SharedSink = Arc<dyn TokenSink>;

/// Complete `prompt`, forwarding tokens to `sink` when one is given
pub async fn complete_with_sink(
    client: &dyn GenerationClient,
    prompt: &str,
    params: &GenerationParams,
    sink: Option<&SharedSink>,
) -> Result<LlmResponse> {
    let Some(sink) = sink else {
        return client.complete(prompt, params).await;
    };

    let (tx, mut rx) = mpsc::channel::<String>(STREAM_CHANNEL_CAPACITY);
    let producer = client.complete_streaming(prompt, params, tx);
    let consumer = async {
        while let Some(token) = rx.recv().await {
            sink.on_token(&token);
        }
    };

    let (result, ()) = tokio::join!(producer, consumer);
    let response = result?;
    sink.on_completion(&response.content);
    Ok(response)
}

/// Splits a byte stream into lines without breaking multi-byte characters
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=newline).collect();
        let text = String::from_utf8_lossy(&line[..line.len() - 1]);
        Some(text.trim_end_matches('\r').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::testing::ScriptedClient;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        tokens: Mutex<Vec<String>>,
        completed: Mutex<Vec<String>>,
    }

    impl TokenSink for Collect {
        fn on_token(&self, token: &str) {
            self.tokens.lock().unwrap().push(token.to_string());
        }

        fn on_completion(&self, text: &str) {
            self.completed.lock().unwrap().push(text.to_string());
        }
    }

    #[tokio::test]
    async fn test_sink_receives_tokens_then_completion() {
        let client = ScriptedClient::new("mock").reply("one two three");
        let collect = Arc::new(Collect::default());
        let sink: SharedSink = collect.clone();

        let response = complete_with_sink(&client, "p", &GenerationParams::default(), Some(&sink))
            .await
            .unwrap();

        assert_eq!(response.content, "one two three");
        assert_eq!(
            *collect.tokens.lock().unwrap(),
            vec!["one ", "two ", "three"]
        );
        assert_eq!(*collect.completed.lock().unwrap(), vec!["one two three"]);
    }

    #[tokio::test]
    async fn test_without_sink_uses_plain_completion() {
        let client = ScriptedClient::new("mock").reply("done");
        let response = complete_with_sink(&client, "p", &GenerationParams::default(), None)
            .await
            .unwrap();
        assert_eq!(response.content, "done");
    }

    #[test]
    fn test_line_buffer_keeps_split_characters() {
        let mut buffer = LineBuffer::default();
        let bytes = "héllo\r\nwörld\n".as_bytes();
        // split inside the two-byte 'é'
        buffer.push(&bytes[..2]);
        assert_eq!(buffer.next_line(), None);
        buffer.push(&bytes[2..]);
        assert_eq!(buffer.next_line().as_deref(), Some("héllo"));
        assert_eq!(buffer.next_line().as_deref(), Some("wörld"));
        assert_eq!(buffer.next_line(), None);
    }
}
