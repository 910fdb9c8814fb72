//! Core chat data model shared by the provider adapters and the
//! streaming orchestrator: conversation turns, the per-call session
//! accumulator, streamed chunks, and grounding metadata.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a turn. Adapters map this onto each wire protocol's
/// role vocabulary ("model" for Gemini, "assistant" elsewhere).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single committed conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// The closed set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    OpenAi,
    Anthropic,
    Groq,
    Xai,
    Local,
}

impl Provider {
    /// Whether requests to this provider require an API key up front.
    /// Local (Ollama-style) endpoints are typically unauthenticated.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Provider::Local)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Google => "google",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Groq => "groq",
            Provider::Xai => "xai",
            Provider::Local => "local",
        };
        f.write_str(name)
    }
}

/// Optional capabilities an agent may enable on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Provider-side web search with grounding metadata (Google only).
    WebSearch,
    /// The `visit_website` browsing tool resolved by the orchestrator.
    Browser,
}

/// A function call surfaced by the model mid-stream. Never persisted;
/// resolved by the orchestrator before any further text is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub args: serde_json::Value,
}

/// The result paired back to a [`ToolCall`]. When the provider omits
/// call ids the pairing is positional, which is why tool calls are
/// resolved sequentially in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: Option<String>,
    pub name: String,
    pub content: String,
}

/// One entry in a session transcript. Tool turns only occur for the
/// native-protocol (Google) adapter; the flat-role adapters skip them
/// when serializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionTurn {
    Message { role: Role, content: String },
    ToolUses(Vec<ToolCall>),
    ToolResults(Vec<ToolResult>),
}

/// The full input to one adapter round: system instruction, transcript
/// so far, and enabled capabilities. The orchestrator appends tool
/// turns between rounds; adapters never mutate it.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub model: String,
    pub system_instruction: String,
    pub turns: Vec<SessionTurn>,
    pub capabilities: Vec<Capability>,
}

impl ChatSession {
    pub fn new(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_instruction: system_instruction.into(),
            turns: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(SessionTurn::Message {
            role,
            content: content.into(),
        });
    }

    pub fn push_history(&mut self, history: &[Turn]) {
        for turn in history {
            self.push_message(turn.role, turn.content.clone());
        }
    }
}

/// A citation extracted from provider grounding data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

/// Search-grounding data attached to a response when web search ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    pub citations: Vec<Citation>,
    pub queries: Vec<String>,
}

impl GroundingMetadata {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty() && self.queries.is_empty()
    }
}

/// Incremental output from a provider adapter, delivered over an
/// unbounded channel while the HTTP stream is consumed.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text(String),
    Grounding(GroundingMetadata),
    /// Tool calls surfaced for the orchestrator to resolve. The adapter
    /// suspends its turn after sending these.
    ToolCalls(Vec<ToolCall>),
    Done,
}

/// The single result of one top-level orchestration call.
#[derive(Debug, Clone, Default)]
pub struct StreamResult {
    pub content: String,
    pub grounding: Option<GroundingMetadata>,
}
