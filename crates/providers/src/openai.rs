//! OpenAI-compatible streaming adapter.
//!
//! One implementation covers every `/chat/completions` endpoint we talk
//! to (OpenAI, Groq, xAI, and local Ollama in OpenAI mode); they differ
//! only in base URL and whether an Authorization header is sent.

use crate::error::StreamError;
use crate::sse::{SseEvent, SseParser};
use crate::ProviderAdapter;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::chat::{ChatSession, Provider, Role, SessionTurn, StreamChunk};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for one OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    http: Client,
    provider: Provider,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(provider: Provider, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Flatten a session into the wire message array: one system turn,
    /// then the transcript. Tool turns are native-protocol only and are
    /// skipped here.
    fn wire_messages(session: &ChatSession) -> Vec<(&'static str, &str)> {
        let mut out = Vec::with_capacity(session.turns.len() + 1);
        out.push(("system", session.system_instruction.as_str()));
        for turn in &session.turns {
            if let SessionTurn::Message { role, content } = turn {
                let role = match role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                out.push((role, content.as_str()));
            }
        }
        out
    }

    /// Handle one SSE event. Returns `true` when the stream is finished
    /// and no further frames should be processed.
    fn handle_event(event: &SseEvent, tx: &UnboundedSender<StreamChunk>) -> bool {
        if event.data == "[DONE]" {
            return true;
        }
        match serde_json::from_str::<StreamResponse>(&event.data) {
            Ok(resp) => {
                if let Some(choice) = resp.choices.first() {
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() {
                            let _ = tx.send(StreamChunk::Text(content.clone()));
                        }
                    }
                    if choice.finish_reason.is_some() {
                        return true;
                    }
                }
                false
            }
            Err(err) => {
                // Malformed frames are skipped, never fatal.
                tracing::debug!("skipping unparseable SSE frame: {err}");
                false
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatClient {
    async fn stream(
        &self,
        session: ChatSession,
        tx: UnboundedSender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let messages: Vec<WireMessage> = Self::wire_messages(&session)
            .into_iter()
            .map(|(role, content)| WireMessage { role, content })
            .collect();
        let body = ChatCompletionRequest {
            model: &session.model,
            messages,
            stream: true,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Aborted),
            resp = request.send() => resp?,
        };
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StreamError::from_response(self.provider, status, &body));
        }

        let mut parser = SseParser::new();
        let mut bytes = resp.bytes_stream();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Aborted),
                chunk = bytes.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            for event in parser.feed(&chunk?) {
                if Self::handle_event(&event, &tx) {
                    let _ = tx.send(StreamChunk::Done);
                    return Ok(());
                }
            }
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::chat::Capability;
    use tokio::sync::mpsc;

    fn collect_text(rx: &mut mpsc::UnboundedReceiver<StreamChunk>) -> String {
        let mut out = String::new();
        while let Ok(chunk) = rx.try_recv() {
            if let StreamChunk::Text(text) = chunk {
                out.push_str(&text);
            }
        }
        out
    }

    #[test]
    fn test_delta_frames_accumulate_and_done_terminates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut parser = SseParser::new();
        let raw = b"data: {\"choices\":[{\"delta\":{\"content\":\"ab\"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"cd\"}}]}\n\n\
                    data: [DONE]\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"IGNORED\"}}]}\n\n";
        let mut finished = false;
        for event in parser.feed(raw) {
            if OpenAiCompatClient::handle_event(&event, &tx) {
                finished = true;
                break;
            }
        }
        assert!(finished);
        assert_eq!(collect_text(&mut rx), "abcd");
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let event = SseEvent {
            event: None,
            data: "{not json".into(),
        };
        assert!(!OpenAiCompatClient::handle_event(&event, &tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_finish_reason_terminates() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let event = SseEvent {
            event: None,
            data: "{\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}".into(),
        };
        assert!(OpenAiCompatClient::handle_event(&event, &tx));
    }

    #[test]
    fn test_wire_messages_flatten_with_system_first() {
        let mut session = ChatSession::new("gpt-4o-mini", "sys")
            .with_capabilities(vec![Capability::Browser]);
        session.push_message(Role::User, "hi");
        session.push_message(Role::Assistant, "hello");
        session.turns.push(SessionTurn::ToolUses(vec![]));
        session.push_message(Role::User, "next");

        let wire = OpenAiCompatClient::wire_messages(&session);
        let roles: Vec<&str> = wire.iter().map(|(r, _)| *r).collect();
        // Tool turns are dropped from the flat serialization.
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(wire[0].1, "sys");
    }
}
