//! Agent-to-agent conversations: two configured agents take turns
//! discussing a topic, each seeing the transcript from its own side.

use crate::ChatClient;
use providers::error::StreamError;
use serde::{Deserialize, Serialize};
use shared::agents::AgentConfig;
use shared::chat::{Role, Turn};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub content: String,
    pub timestamp: i64,
    /// 1-based turn index; both agents speaking once makes two turns.
    pub turn_number: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
    Paused,
}

/// A two-agent exchange on a fixed topic, bounded by `max_turns`
/// speaking turns per agent.
#[derive(Debug, Clone)]
pub struct AgentConversation {
    pub id: String,
    pub agents: [AgentConfig; 2],
    pub topic: String,
    pub messages: Vec<ConversationMessage>,
    pub max_turns: usize,
    pub status: ConversationStatus,
}

impl AgentConversation {
    pub fn new(agents: [AgentConfig; 2], topic: impl Into<String>, max_turns: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agents,
            topic: topic.into(),
            messages: Vec::new(),
            max_turns,
            status: ConversationStatus::Active,
        }
    }

    /// The agent who speaks next. Agents strictly alternate, starting
    /// with the first.
    pub fn speaker(&self) -> &AgentConfig {
        &self.agents[self.messages.len() % 2]
    }

    /// The prompt handed to the next speaker: the opener for the first
    /// turn, otherwise a relay of what the other agent just said.
    pub fn next_prompt(&self) -> String {
        match self.messages.last() {
            None => format!("Start a discussion about: {}", self.topic),
            Some(last) => format!(
                "{} just said: \"{}\". Now respond as {} to continue the discussion \
                 about {}. Keep your response concise and focused.",
                last.agent_name,
                last.content,
                self.speaker().name,
                self.topic
            ),
        }
    }

    /// The transcript from one agent's point of view: its own messages
    /// read as assistant turns, the other agent's as user turns.
    pub fn history_for(&self, agent_id: &str) -> Vec<Turn> {
        self.messages
            .iter()
            .map(|message| {
                let role = if message.agent_id == agent_id {
                    Role::Assistant
                } else {
                    Role::User
                };
                Turn::new(role, message.content.clone())
            })
            .collect()
    }

    pub fn pause(&mut self) {
        if self.status == ConversationStatus::Active {
            self.status = ConversationStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == ConversationStatus::Paused {
            self.status = ConversationStatus::Active;
        }
    }

    /// Produce the next speaking turn. Returns the finished message, or
    /// `None` when the conversation is not active.
    pub async fn next_turn(
        &mut self,
        client: &ChatClient,
        tx: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<Option<&ConversationMessage>, StreamError> {
        if self.status != ConversationStatus::Active {
            return Ok(None);
        }

        let speaker = self.speaker().clone();
        let history = self.history_for(&speaker.id);
        let prompt = self.next_prompt();
        tracing::debug!(
            conversation = %self.id,
            speaker = %speaker.name,
            turn = self.messages.len() + 1,
            "running conversation turn"
        );
        let result = client
            .stream_reply(&speaker, &history, &prompt, tx, cancel)
            .await?;

        self.messages.push(ConversationMessage {
            id: Uuid::new_v4().to_string(),
            agent_id: speaker.id,
            agent_name: speaker.name,
            content: result.content,
            timestamp: chrono::Utc::now().timestamp_millis(),
            turn_number: self.messages.len() + 1,
        });
        if self.messages.len() >= self.max_turns * 2 {
            self.status = ConversationStatus::Completed;
        }
        Ok(self.messages.last())
    }
}
