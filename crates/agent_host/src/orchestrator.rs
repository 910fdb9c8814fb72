//! The streaming orchestrator: drives a provider adapter, resolves
//! model-issued browsing calls, and re-issues the session with tool
//! results until the model produces a text-only turn.
//!
//! The tool loop is an explicit loop with a round counter, capped at
//! [`MAX_TOOL_ROUNDS`], so termination is auditable. Tool calls are
//! resolved sequentially in declaration order; providers without call
//! ids correlate responses positionally.

use crate::browser::ToolExecutor;
use providers::error::StreamError;
use providers::{ProviderAdapter, VISIT_WEBSITE_TOOL};
use shared::chat::{
    Capability, ChatSession, SessionTurn, StreamChunk, StreamResult, ToolCall, ToolResult,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Upper bound on continuation rounds for one top-level call.
pub const MAX_TOOL_ROUNDS: usize = 5;

/// User-visible placeholder emitted while tool calls resolve. Sent to
/// the chunk stream only; it is never part of the final result content.
pub const BROWSING_NOTICE: &str = " *Browsing web...* ";

/// Run one top-level orchestration call. Text chunks are forwarded to
/// `tx` as they arrive; exactly one [`StreamResult`] or one error comes
/// back. Aborts surface as [`StreamError::Aborted`], never wrapped.
pub async fn stream_response(
    adapter: Arc<dyn ProviderAdapter>,
    mut session: ChatSession,
    tool: Arc<dyn ToolExecutor>,
    tx: UnboundedSender<String>,
    cancel: CancellationToken,
) -> Result<StreamResult, StreamError> {
    let mut result = StreamResult::default();
    let mut rounds = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(StreamError::Aborted);
        }

        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
        let round = {
            let adapter = adapter.clone();
            let session = session.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { adapter.stream(session, chunk_tx, cancel).await })
        };

        let mut pending: Vec<ToolCall> = Vec::new();
        while let Some(chunk) = chunk_rx.recv().await {
            match chunk {
                StreamChunk::Text(text) => {
                    result.content.push_str(&text);
                    let _ = tx.send(text);
                }
                StreamChunk::Grounding(grounding) => {
                    // Grounding persists across continuation rounds.
                    result.grounding = Some(grounding);
                }
                StreamChunk::ToolCalls(mut calls) => pending.append(&mut calls),
                StreamChunk::Done => break,
            }
        }

        let round_outcome = round
            .await
            .map_err(|err| StreamError::Protocol(format!("adapter task failed: {err}")))?;
        match round_outcome {
            Ok(()) => {}
            Err(err) if err.is_abort() => return Err(err),
            Err(err) if rounds > 0 => {
                // A failed continuation degrades to a visible note, as
                // the page content has already been fetched and shown.
                let _ = tx.send(format!(
                    "\n\n[System Error: Failed to send tool response - {err}]\n\n"
                ));
                return Ok(result);
            }
            Err(err) => return Err(err),
        }

        if pending.is_empty() {
            return Ok(result);
        }
        if !session.has_capability(Capability::Browser) {
            tracing::warn!(
                "ignoring {} tool call(s); browsing capability is disabled",
                pending.len()
            );
            return Ok(result);
        }

        rounds += 1;
        if rounds > MAX_TOOL_ROUNDS {
            return Err(StreamError::ToolLoopExceeded {
                max_rounds: MAX_TOOL_ROUNDS,
            });
        }

        let _ = tx.send(BROWSING_NOTICE.to_string());
        let results = resolve_tool_calls(&pending, tool.as_ref(), &cancel).await?;
        if results.is_empty() {
            return Ok(result);
        }
        session.turns.push(SessionTurn::ToolUses(pending));
        session.turns.push(SessionTurn::ToolResults(results));
    }
}

/// Execute tool calls one at a time, in declaration order. A failing
/// execution becomes an error-content result so the conversation can
/// continue; only cancellation stops the walk.
async fn resolve_tool_calls(
    calls: &[ToolCall],
    tool: &dyn ToolExecutor,
    cancel: &CancellationToken,
) -> Result<Vec<ToolResult>, StreamError> {
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        if cancel.is_cancelled() {
            return Err(StreamError::Aborted);
        }
        if call.name != VISIT_WEBSITE_TOOL {
            tracing::warn!("skipping unknown tool call {:?}", call.name);
            continue;
        }
        let url = call
            .args
            .get("url")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let content = match tool.browse(url).await {
            Ok(content) => content,
            Err(err) => format!("Error: Failed to fetch URL ({err})."),
        };
        results.push(ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use shared::chat::Role;
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Adapter scripted per round: the round index is the number of
    /// tool-result turns already in the session.
    struct ScriptedAdapter {
        rounds: Vec<Vec<StreamChunk>>,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        async fn stream(
            &self,
            session: ChatSession,
            tx: UnboundedSender<StreamChunk>,
            _cancel: CancellationToken,
        ) -> Result<(), StreamError> {
            let round = session
                .turns
                .iter()
                .filter(|turn| matches!(turn, SessionTurn::ToolResults(_)))
                .count();
            let chunks = self
                .rounds
                .get(round)
                .cloned()
                .unwrap_or_else(|| vec![StreamChunk::Done]);
            for chunk in chunks {
                let _ = tx.send(chunk);
            }
            Ok(())
        }
    }

    /// Records browse calls; panics when configured as unreachable.
    struct RecordingTool {
        calls: Mutex<Vec<String>>,
        reply: String,
        forbid_calls: bool,
    }

    impl RecordingTool {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply: reply.to_string(),
                forbid_calls: false,
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply: String::new(),
                forbid_calls: true,
            })
        }
    }

    #[async_trait]
    impl ToolExecutor for RecordingTool {
        async fn browse(&self, url: &str) -> Result<String> {
            assert!(!self.forbid_calls, "tool executor must not be invoked");
            self.calls.lock().unwrap().push(url.to_string());
            Ok(self.reply.clone())
        }
    }

    fn browsing_session() -> ChatSession {
        let mut session = ChatSession::new("gemini-3-flash-preview", "sys")
            .with_capabilities(vec![Capability::Browser]);
        session.push_message(Role::User, "open example.com");
        session
    }

    fn tool_call(url: &str) -> ToolCall {
        ToolCall {
            id: None,
            name: VISIT_WEBSITE_TOOL.into(),
            args: json!({ "url": url }),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_plain_text_round_returns_result() {
        let adapter = Arc::new(ScriptedAdapter {
            rounds: vec![vec![
                StreamChunk::Text("Hello".into()),
                StreamChunk::Text(" world".into()),
                StreamChunk::Done,
            ]],
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = stream_response(
            adapter,
            browsing_session(),
            RecordingTool::unreachable(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(result.content, "Hello world");
        assert_eq!(drain(&mut rx).join(""), "Hello world");
    }

    #[tokio::test]
    async fn test_tool_call_resolves_and_continues() {
        let adapter = Arc::new(ScriptedAdapter {
            rounds: vec![
                vec![
                    StreamChunk::ToolCalls(vec![tool_call("example.com")]),
                    StreamChunk::Done,
                ],
                vec![
                    StreamChunk::Text(
                        "Here's what I found: Example Domain content...".into(),
                    ),
                    StreamChunk::Done,
                ],
            ],
        });
        let tool = RecordingTool::replying("Example Domain content...");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = stream_response(
            adapter,
            browsing_session(),
            tool.clone(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(result
            .content
            .ends_with("Here's what I found: Example Domain content..."));
        // The placeholder notice precedes the continuation text in the
        // chunk stream but is absent from the committed content.
        let chunks = drain(&mut rx);
        let notice_at = chunks.iter().position(|c| c == BROWSING_NOTICE).unwrap();
        let text_at = chunks
            .iter()
            .position(|c| c.contains("Here's what I found"))
            .unwrap();
        assert!(notice_at < text_at);
        assert!(!result.content.contains(BROWSING_NOTICE));
        assert_eq!(tool.calls.lock().unwrap().as_slice(), ["example.com"]);
    }

    #[tokio::test]
    async fn test_tool_calls_run_sequentially_in_order() {
        let adapter = Arc::new(ScriptedAdapter {
            rounds: vec![
                vec![
                    StreamChunk::ToolCalls(vec![
                        tool_call("first.example"),
                        tool_call("second.example"),
                    ]),
                    StreamChunk::Done,
                ],
                vec![StreamChunk::Text("done".into()), StreamChunk::Done],
            ],
        });
        let tool = RecordingTool::replying("page");
        let (tx, _rx) = mpsc::unbounded_channel();
        stream_response(
            adapter,
            browsing_session(),
            tool.clone(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            tool.calls.lock().unwrap().as_slice(),
            ["first.example", "second.example"]
        );
    }

    #[tokio::test]
    async fn test_tool_calls_ignored_without_capability() {
        let adapter = Arc::new(ScriptedAdapter {
            rounds: vec![vec![
                StreamChunk::Text("I would browse".into()),
                StreamChunk::ToolCalls(vec![tool_call("example.com")]),
                StreamChunk::Done,
            ]],
        });
        let mut session = ChatSession::new("gemini-3-flash-preview", "sys");
        session.push_message(Role::User, "open example.com");

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = stream_response(
            adapter,
            session,
            RecordingTool::unreachable(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(result.content, "I would browse");
    }

    #[tokio::test]
    async fn test_runaway_tool_loop_is_bounded() {
        // Every round asks for another page; the loop must fail instead
        // of spinning forever.
        let adapter = Arc::new(ScriptedAdapter {
            rounds: (0..=MAX_TOOL_ROUNDS + 1)
                .map(|_| {
                    vec![
                        StreamChunk::ToolCalls(vec![tool_call("example.com")]),
                        StreamChunk::Done,
                    ]
                })
                .collect(),
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = stream_response(
            adapter,
            browsing_session(),
            RecordingTool::replying("page"),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            StreamError::ToolLoopExceeded {
                max_rounds: MAX_TOOL_ROUNDS
            }
        ));
    }

    #[tokio::test]
    async fn test_grounding_survives_continuation() {
        let grounding = shared::chat::GroundingMetadata {
            citations: vec![shared::chat::Citation {
                uri: "https://a.example".into(),
                title: "A".into(),
            }],
            queries: vec![],
        };
        let adapter = Arc::new(ScriptedAdapter {
            rounds: vec![
                vec![
                    StreamChunk::Grounding(grounding.clone()),
                    StreamChunk::ToolCalls(vec![tool_call("example.com")]),
                    StreamChunk::Done,
                ],
                vec![StreamChunk::Text("answer".into()), StreamChunk::Done],
            ],
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = stream_response(
            adapter,
            browsing_session(),
            RecordingTool::replying("page"),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(result.grounding, Some(grounding));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_aborts() {
        let adapter = Arc::new(ScriptedAdapter { rounds: vec![] });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = stream_response(
            adapter,
            browsing_session(),
            RecordingTool::unreachable(),
            tx,
            cancel,
        )
        .await
        .unwrap_err();
        assert!(err.is_abort());
    }
}
