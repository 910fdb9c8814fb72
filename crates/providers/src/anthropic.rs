//! Anthropic Messages API streaming adapter.
//!
//! Same SSE transport as the OpenAI-compatible endpoints but a distinct
//! event schema: text arrives in `content_block_delta` events and
//! `message_stop` ends the stream. The system instruction is a
//! top-level request field, not a message.

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

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: i32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: i32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<EventDelta>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClient {
    http: Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            api_key,
        }
    }

    fn wire_messages(session: &ChatSession) -> Vec<(&'static str, &str)> {
        session
            .turns
            .iter()
            .filter_map(|turn| match turn {
                SessionTurn::Message { role, content } => {
                    let role = match role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    };
                    Some((role, content.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    /// Returns `true` when the stream is finished.
    fn handle_event(event: &SseEvent, tx: &UnboundedSender<StreamChunk>) -> bool {
        if event.data == "[DONE]" {
            return true;
        }
        match serde_json::from_str::<StreamEvent>(&event.data) {
            Ok(parsed) => match parsed.event_type.as_str() {
                "content_block_delta" => {
                    if let Some(delta) = &parsed.delta {
                        if delta.delta_type.as_deref() == Some("text_delta") {
                            if let Some(text) = &delta.text {
                                if !text.is_empty() {
                                    let _ = tx.send(StreamChunk::Text(text.clone()));
                                }
                            }
                        }
                    }
                    false
                }
                "message_stop" => true,
                _ => false,
            },
            Err(err) => {
                tracing::debug!("skipping unparseable Anthropic frame: {err}");
                false
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicClient {
    async fn stream(
        &self,
        session: ChatSession,
        tx: UnboundedSender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        let messages: Vec<WireMessage> = Self::wire_messages(&session)
            .into_iter()
            .map(|(role, content)| WireMessage { role, content })
            .collect();
        let body = MessagesRequest {
            model: &session.model,
            system: &session.system_instruction,
            messages,
            max_tokens: MAX_TOKENS,
            stream: true,
        };

        let request = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body);

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Aborted),
            resp = request.send() => resp?,
        };
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StreamError::from_response(
                Provider::Anthropic,
                status,
                &body,
            ));
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
