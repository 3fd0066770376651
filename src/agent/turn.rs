//! The bounded tool-calling state machine shared by every loop.

use crate::error::TurnError;
use crate::llm::{LanguageModel, Message};

use super::tools::ToolDispatcher;

/// Maximum "model asks for tools -> tools run" rounds per turn.
pub const MAX_TOOL_ROUNDS: usize = 10;

/// Drive the model until it answers without tool calls and return that
/// answer's text.
///
/// Tool calls are executed one at a time, in order; each produces exactly one
/// tool-result message linked by call id. The turn fails if the model call
/// fails, returns no choices, asks for tools when `tools` is `None`, or is
/// still asking for tools after [`MAX_TOOL_ROUNDS`].
pub async fn run_tool_loop(
    llm: &dyn LanguageModel,
    tools: Option<&dyn ToolDispatcher>,
    mut messages: Vec<Message>,
) -> Result<String, TurnError> {
    let definitions = tools.map(|t| t.definitions()).unwrap_or_default();

    for round in 1..=MAX_TOOL_ROUNDS {
        let response = llm.complete(&messages, &definitions).await?;
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or(TurnError::NoChoices)?
            .message;

        if message.tool_calls.is_empty() {
            return Ok(message.content);
        }

        let Some(tools) = tools else {
            tracing::warn!(
                calls = message.tool_calls.len(),
                "Model requested tools but none are configured"
            );
            return Err(TurnError::ToolsUnavailable);
        };

        tracing::debug!(round, calls = message.tool_calls.len(), "Model requested tools");
        let calls = message.tool_calls.clone();
        messages.push(message);
        for call in calls {
            let result = tools.execute(&call.name, call.arguments).await;
            tracing::debug!(tool = %call.name, success = result.success, "Tool call finished");
            messages.push(Message::tool_result(call.id, result.to_json()));
        }
    }

    Err(TurnError::RoundsExhausted(MAX_TOOL_ROUNDS))
}
