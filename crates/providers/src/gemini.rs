//! Google Gemini native-protocol streaming adapter.
//!
//! This is the only adapter family with tool support: browsing is
//! declared as a `visit_website` function and Google search as a
//! provider-side tool. Function calls are surfaced to the caller as
//! [`StreamChunk::ToolCalls`] and never resolved here; the orchestrator
//! appends the results to the session and re-issues the stream.

use crate::error::StreamError;
use crate::sse::SseParser;
use crate::ProviderAdapter;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::chat::{
    Capability, ChatSession, Citation, GroundingMetadata, Provider, Role, SessionTurn,
    StreamChunk, ToolCall,
};
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

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Name of the browsing function declared to the model.
pub const VISIT_WEBSITE_TOOL: &str = "visit_website";

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(
        rename = "functionCall",
        skip_serializing_if = "Option::is_none",
        default
    )]
    function_call: Option<WireFunctionCall>,
    #[serde(
        rename = "functionResponse",
        skip_serializing_if = "Option::is_none",
        default
    )]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<String>,
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(rename = "groundingMetadata", default)]
    grounding_metadata: Option<WireGrounding>,
}

#[derive(Debug, Deserialize)]
struct WireGrounding {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<WireGroundingChunk>,
    #[serde(rename = "webSearchQueries", default)]
    web_search_queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireGroundingChunk {
    #[serde(default)]
    web: Option<WireWebSource>,
}

#[derive(Debug, Deserialize)]
struct WireWebSource {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    title: String,
}

// ── Client ───────────────────────────────────────────────────────────

pub struct GeminiClient {
    http: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            api_key,
        }
    }

    fn declaration_for_browser() -> serde_json::Value {
        json!({
            "name": VISIT_WEBSITE_TOOL,
            "description": "REQUIRED TOOL: Visits a website and retrieves its text content. \
                You MUST use this when user asks to open, launch, browse, visit, or view any \
                website. Also use when user wants information from a specific URL. This is \
                your primary way to access web content.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "url": {
                        "type": "STRING",
                        "description": "The complete URL to visit (must include https://). \
                            Examples: https://google.com, https://amazon.com/s?k=shoes"
                    }
                },
                "required": ["url"]
            }
        })
    }

    fn build_tools(session: &ChatSession) -> Vec<serde_json::Value> {
        let mut tools = Vec::new();
        if session.has_capability(Capability::WebSearch) {
            tools.push(json!({ "googleSearch": {} }));
        }
        if session.has_capability(Capability::Browser) {
            tools.push(json!({ "functionDeclarations": [Self::declaration_for_browser()] }));
        }
        tools
    }

    fn build_contents(session: &ChatSession) -> Vec<Content> {
        session
            .turns
            .iter()
            .map(|turn| match turn {
                SessionTurn::Message { role, content } => {
                    // Gemini's role vocabulary is "user" | "model".
                    let role = match role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    };
                    Content {
                        role: Some(role.to_string()),
                        parts: vec![Part {
                            text: Some(content.clone()),
                            ..Default::default()
                        }],
                    }
                }
                SessionTurn::ToolUses(calls) => Content {
                    role: Some("model".to_string()),
                    parts: calls
                        .iter()
                        .map(|call| Part {
                            function_call: Some(WireFunctionCall {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                args: Some(call.args.clone()),
                            }),
                            ..Default::default()
                        })
                        .collect(),
                },
                SessionTurn::ToolResults(results) => Content {
                    role: Some("user".to_string()),
                    parts: results
                        .iter()
                        .map(|result| Part {
                            function_response: Some(WireFunctionResponse {
                                id: result.call_id.clone(),
                                name: result.name.clone(),
                                response: json!({ "content": result.content }),
                            }),
                            ..Default::default()
                        })
                        .collect(),
                },
            })
            .collect()
    }

    fn build_request(session: &ChatSession) -> GenerateRequest {
        GenerateRequest {
            contents: Self::build_contents(session),
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(session.system_instruction.clone()),
                    ..Default::default()
                }],
            },
            tools: Self::build_tools(session),
        }
    }

    fn normalize_grounding(wire: WireGrounding) -> GroundingMetadata {
        GroundingMetadata {
            citations: wire
                .grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .filter(|web| !web.uri.is_empty())
                .map(|web| Citation {
                    uri: web.uri,
                    title: web.title,
                })
                .collect(),
            queries: wire.web_search_queries,
        }
    }

    /// Handle one streamed `GenerateContentResponse`. Text and tool
    /// calls may arrive in the same frame; tool calls are forwarded as
    /// a batch so the caller resolves them in declaration order.
    fn handle_frame(data: &str, tx: &UnboundedSender<StreamChunk>) {
        let parsed: GenerateResponse = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!("skipping unparseable Gemini frame: {err}");
                return;
            }
        };
        let Some(candidate) = parsed.candidates.into_iter().next() else {
            return;
        };

        if let Some(grounding) = candidate.grounding_metadata {
            let normalized = Self::normalize_grounding(grounding);
            if !normalized.is_empty() {
                let _ = tx.send(StreamChunk::Grounding(normalized));
            }
        }

        let Some(content) = candidate.content else {
            return;
        };
        let mut calls = Vec::new();
        for part in content.parts {
            if let Some(text) = part.text {
                if !text.is_empty() {
                    let _ = tx.send(StreamChunk::Text(text));
                }
            }
            if let Some(call) = part.function_call {
                calls.push(ToolCall {
                    id: call.id,
                    name: call.name,
                    args: call.args.unwrap_or_else(|| json!({})),
                });
            }
        }
        if !calls.is_empty() {
            let _ = tx.send(StreamChunk::ToolCalls(calls));
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiClient {
    async fn stream(
        &self,
        session: ChatSession,
        tx: UnboundedSender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            BASE_URL, session.model, self.api_key
        );
        let body = Self::build_request(&session);

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Aborted),
            resp = self.http.post(&url).json(&body).send() => resp?,
        };
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StreamError::from_response(Provider::Google, status, &body));
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
                Self::handle_frame(&event.data, &tx);
            }
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(())
    }
}
