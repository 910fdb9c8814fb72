//! Agent persona configuration and the stock agents shipped with the app.

use crate::chat::{Capability, Provider};
use serde::{Deserialize, Serialize};

/// A configured chat agent: persona, provider binding, and capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_instruction: String,
    pub provider: Provider,
    pub model: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub color: Option<String>,
}

pub const DEFAULT_FLASH_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_PRO_MODEL: &str = "gemini-3-pro-preview";

/// The three stock personas presented on first run.
pub fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            id: "agent-1".into(),
            name: "Nexus Assistant".into(),
            description: "A helpful and versatile general assistant.".into(),
            system_instruction: "You are Nexus, a helpful, witty, and precise AI assistant. \
                You aim to provide clear and concise answers. You are knowledgeable about \
                code, science, and general trivia."
                .into(),
            provider: Provider::Google,
            model: DEFAULT_FLASH_MODEL.into(),
            capabilities: vec![],
            color: Some("blue".into()),
        },
        AgentConfig {
            id: "agent-2".into(),
            name: "Code Architect".into(),
            description: "Expert in software design patterns and React.".into(),
            system_instruction: "You are a senior principal software engineer. You specialize \
                in React, TypeScript, and Tailwind CSS. You prefer functional programming \
                patterns and emphasize clean, maintainable code. You are critical but \
                constructive."
                .into(),
            provider: Provider::Google,
            model: DEFAULT_PRO_MODEL.into(),
            capabilities: vec![],
            color: Some("emerald".into()),
        },
        AgentConfig {
            id: "agent-3".into(),
            name: "Creative Spark".into(),
            description: "A creative writing partner for stories and poems.".into(),
            system_instruction: "You are a creative writing muse. You help users brainstorm \
                ideas, write scenes, and improve prose. Your tone is inspiring, imaginative, \
                and slightly poetic."
                .into(),
            provider: Provider::Google,
            model: DEFAULT_PRO_MODEL.into(),
            capabilities: vec![],
            color: Some("purple".into()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_agents_have_unique_ids() {
        let agents = default_agents();
        assert_eq!(agents.len(), 3);
        let mut ids: Vec<_> = agents.iter().map(|a| a.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_agent_config_roundtrip() {
        let agent = &default_agents()[0];
        let json = serde_json::to_string(agent).unwrap();
        let back: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, agent.name);
        assert_eq!(back.provider, Provider::Google);
    }
}
