//! System prompt assembly.
//!
//! The prompt wraps the workspace persona (`SOUL.md`) and skills with the
//! harness context: available tools and the response-format contract that
//! [`super::response::parse_agent_response`] expects.

use crate::llm::ToolDefinition;
use crate::workspace::Workspace;

/// Which loop the prompt is for. Only the framing text differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Talking with the owner over chat.
    Chat,
    /// Running unattended against a mission.
    Autonomous,
}

const RESPONSE_FORMAT: &str = "\
Always answer with a single JSON object and nothing else:

{\"type\": \"message\", \"content\": \"...\"}

- `message`: text for the owner. Only this kind is delivered.
- `think`: a private note. Never delivered.
- `noop`: nothing to say or do; `content` may be empty.";

pub fn build_system_prompt(
    workspace: &Workspace,
    tools: &[ToolDefinition],
    mode: PromptMode,
) -> String {
    let framing = match mode {
        PromptMode::Chat => {
            "You are a personal assistant talking with your owner through a chat app. \
             Keep replies short and conversational."
        }
        PromptMode::Autonomous => {
            "You are a sub-agent running unattended. Nobody will answer questions. \
             Complete the mission you are given, then reply with a `message` whose \
             content is your final result. That content is saved as the result of \
             the task."
        }
    };

    let mut prompt = format!(
        "{framing}\n\n## Environment\n- Workspace: {}\n",
        workspace.root.display()
    );

    if tools.is_empty() {
        prompt.push_str("\n## Tools\nNo tools are available.\n");
    } else {
        prompt.push_str("\n## Tools\n");
        for tool in tools {
            prompt.push_str(&format!("- `{}`: {}\n", tool.name, tool.description));
        }
    }

    prompt.push_str("\n## Response format\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt.push_str("\n\n## Persona\n\n");
    prompt.push_str(workspace.persona.trim());
    prompt.push('\n');

    for skill in &workspace.skills {
        prompt.push_str(&format!("\n## Skill: {}\n\n{}\n", skill.name, skill.content.trim()));
    }

    prompt
}
