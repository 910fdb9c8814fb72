//! Agent host: wires provider adapters, the browsing tool, and the
//! playback reconciler into one chat client.

pub mod browser;
pub mod convo;
pub mod orchestrator;
pub mod playback;
pub mod prompts;

use crate::browser::{BrowserTool, ToolExecutor};
use crate::playback::{run_typewriter, PlaybackConfig, PlaybackEnd};
use providers::error::StreamError;
use providers::router::ProviderRouter;
use providers::ProviderAdapter;
use shared::agents::AgentConfig;
use shared::chat::{ChatSession, Role, StreamResult, Turn};
use shared::settings::AppSettings;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// One finished assistant turn, ready to append to the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantTurn {
    pub content: String,
    pub grounding: Option<shared::chat::GroundingMetadata>,
    pub timestamp: i64,
}

impl AssistantTurn {
    fn now(content: String, grounding: Option<shared::chat::GroundingMetadata>) -> Self {
        Self {
            content,
            grounding,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// How a top-level send ended. A stop is not a failure: whatever text
/// had arrived is committed as a normal turn.
#[derive(Debug)]
pub enum ChatOutcome {
    Completed(AssistantTurn),
    Stopped(Option<AssistantTurn>),
    Failed(StreamError),
}

/// The top-level chat client. Owns the provider router, the browsing
/// tool, and the playback pacing knobs.
pub struct ChatClient {
    router: ProviderRouter,
    browser: Arc<dyn ToolExecutor>,
    playback: PlaybackConfig,
}

impl ChatClient {
    pub fn new(settings: AppSettings) -> Self {
        let browser = Arc::new(BrowserTool::new(settings.renderer_endpoint.as_deref()));
        Self {
            router: ProviderRouter::new(settings),
            browser,
            playback: PlaybackConfig::default(),
        }
    }

    pub fn with_playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    fn session_for(agent: &AgentConfig, history: &[Turn], prompt: &str) -> ChatSession {
        let mut session = ChatSession::new(&agent.model, prompts::system_instruction_for(agent))
            .with_capabilities(agent.capabilities.clone());
        session.push_history(history);
        session.push_message(Role::User, prompt);
        session
    }

    /// Stream a reply without playback pacing. Text chunks go to `tx`
    /// as fast as the provider produces them.
    pub async fn stream_reply(
        &self,
        agent: &AgentConfig,
        history: &[Turn],
        prompt: &str,
        tx: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<StreamResult, StreamError> {
        let adapter = self.router.adapter_for(agent.provider)?;
        let session = Self::session_for(agent, history, prompt);
        orchestrator::stream_response(adapter, session, self.browser.clone(), tx, cancel).await
    }

    /// Send a user message and reveal the reply at reading pace via
    /// `on_reveal`. Cancellation commits whatever had arrived.
    pub async fn send_message(
        &self,
        agent: &AgentConfig,
        history: &[Turn],
        prompt: &str,
        on_reveal: impl FnMut(&str),
        cancel: CancellationToken,
    ) -> ChatOutcome {
        let adapter = match self.router.adapter_for(agent.provider) {
            Ok(adapter) => adapter,
            Err(err) => return ChatOutcome::Failed(err),
        };
        let session = Self::session_for(agent, history, prompt);
        run_exchange(
            adapter,
            session,
            self.browser.clone(),
            self.playback.clone(),
            on_reveal,
            cancel,
        )
        .await
    }
}

/// Run one full exchange: orchestrate the provider stream, pace the
/// arriving text through the typewriter, then reconcile the paced view
/// with the true upstream outcome.
pub async fn run_exchange(
    adapter: Arc<dyn ProviderAdapter>,
    session: ChatSession,
    tool: Arc<dyn ToolExecutor>,
    playback: PlaybackConfig,
    on_reveal: impl FnMut(&str),
    cancel: CancellationToken,
) -> ChatOutcome {
    let started = tokio::time::Instant::now();
    let (tx, rx) = mpsc::unbounded_channel();
    let upstream = {
        let cancel = cancel.clone();
        tokio::spawn(orchestrator::stream_response(adapter, session, tool, tx, cancel))
    };

    let (full_text, end) = run_typewriter(rx, started, &playback, on_reveal, &cancel).await;

    match end {
        PlaybackEnd::Cancelled => {
            upstream.abort();
            let trimmed = full_text.trim();
            if trimmed.is_empty() {
                ChatOutcome::Stopped(None)
            } else {
                ChatOutcome::Stopped(Some(AssistantTurn::now(trimmed.to_string(), None)))
            }
        }
        PlaybackEnd::Drained => match upstream.await {
            Ok(Ok(result)) => {
                // The orchestrator's content is authoritative; the paced
                // text includes transient notices.
                let content = if result.content.is_empty() {
                    full_text
                } else {
                    result.content
                };
                ChatOutcome::Completed(AssistantTurn::now(content, result.grounding))
            }
            Ok(Err(err)) if err.is_abort() => {
                let trimmed = full_text.trim();
                if trimmed.is_empty() {
                    ChatOutcome::Stopped(None)
                } else {
                    ChatOutcome::Stopped(Some(AssistantTurn::now(trimmed.to_string(), None)))
                }
            }
            Ok(Err(err)) => ChatOutcome::Failed(err),
            Err(err) => {
                ChatOutcome::Failed(StreamError::Protocol(format!("exchange task failed: {err}")))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared::chat::{Capability, StreamChunk};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Emits two chunks, then either finishes or parks until cancelled.
    struct SlowAdapter {
        park_after_chunks: bool,
    }

    #[async_trait]
    impl ProviderAdapter for SlowAdapter {
        async fn stream(
            &self,
            _session: ChatSession,
            tx: UnboundedSender<StreamChunk>,
            cancel: CancellationToken,
        ) -> Result<(), StreamError> {
            let _ = tx.send(StreamChunk::Text("Hello".into()));
            let _ = tx.send(StreamChunk::Text(" world".into()));
            if self.park_after_chunks {
                cancel.cancelled().await;
                return Err(StreamError::Aborted);
            }
            let _ = tx.send(StreamChunk::Done);
            Ok(())
        }
    }

    struct NoTool;

    #[async_trait]
    impl ToolExecutor for NoTool {
        async fn browse(&self, _url: &str) -> anyhow::Result<String> {
            anyhow::bail!("no browsing in this test")
        }
    }

    fn session() -> ChatSession {
        let mut session = ChatSession::new("gemini-3-flash-preview", "sys")
            .with_capabilities(vec![Capability::Browser]);
        session.push_message(Role::User, "hi");
        session
    }

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str)) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |prefix: &str| {
            sink.lock().unwrap().push(prefix.to_string())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_exchange_commits_full_content() {
        let (seen, on_reveal) = collector();
        let outcome = run_exchange(
            Arc::new(SlowAdapter {
                park_after_chunks: false,
            }),
            session(),
            Arc::new(NoTool),
            PlaybackConfig::default(),
            on_reveal,
            CancellationToken::new(),
        )
        .await;

        match outcome {
            ChatOutcome::Completed(turn) => assert_eq!(turn.content, "Hello world"),
            other => panic!("expected completion, got {other:?}"),
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last().map(String::as_str), Some("Hello world"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_playback_commits_arrived_text() {
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(550)).await;
            stopper.cancel();
        });

        let (_seen, on_reveal) = collector();
        let outcome = run_exchange(
            Arc::new(SlowAdapter {
                park_after_chunks: true,
            }),
            session(),
            Arc::new(NoTool),
            PlaybackConfig::default(),
            on_reveal,
            cancel,
        )
        .await;

        // Everything that had arrived upstream is kept, including text
        // the typewriter had not yet revealed.
        match outcome {
            ChatOutcome::Stopped(Some(turn)) => assert_eq!(turn.content, "Hello world"),
            other => panic!("expected stopped with content, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_any_text_commits_nothing() {
        struct SilentAdapter;

        #[async_trait]
        impl ProviderAdapter for SilentAdapter {
            async fn stream(
                &self,
                _session: ChatSession,
                _tx: UnboundedSender<StreamChunk>,
                cancel: CancellationToken,
            ) -> Result<(), StreamError> {
                cancel.cancelled().await;
                Err(StreamError::Aborted)
            }
        }

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        let (_seen, on_reveal) = collector();
        let outcome = run_exchange(
            Arc::new(SilentAdapter),
            session(),
            Arc::new(NoTool),
            PlaybackConfig::default(),
            on_reveal,
            cancel,
        )
        .await;
        assert!(matches!(outcome, ChatOutcome::Stopped(None)));
    }
}
