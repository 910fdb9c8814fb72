//! System-instruction assembly for an agent request.

use shared::agents::AgentConfig;
use shared::chat::Capability;

/// Appendix injected when browsing is enabled. Models tend to refuse
/// "open this website" requests unless told the tool makes it possible.
const BROWSER_TOOL_INSTRUCTIONS: &str = "\n\n[CRITICAL BROWSER TOOL INSTRUCTIONS]: You MUST use the 'visit_website' function when:
    - User says \"open [website]\", \"launch [website]\", \"go to [website]\", \"browse [website]\", \"visit [website]\"
    - User asks \"what's on [website]\" or \"show me [website]\"
    - User wants to search a specific site (construct the URL: https://site.com/search?q=query)
    - NEVER say you cannot open websites or apps - you CAN and MUST use visit_website
    - Always call visit_website with full URLs including https://
    - After getting content, summarize what you found on the page";

/// The full system instruction for one request: the agent's persona,
/// plus the browsing appendix when that capability is on.
pub fn system_instruction_for(agent: &AgentConfig) -> String {
    let mut instruction = agent.system_instruction.clone();
    if agent.capabilities.contains(&Capability::Browser) {
        instruction.push_str(BROWSER_TOOL_INSTRUCTIONS);
    }
    instruction
}
