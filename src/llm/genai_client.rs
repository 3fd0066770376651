//! [`LanguageModel`] backed by the `genai` multi-provider client.
//!
//! Provider keys come from the environment (`OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`, ...), resolved by `genai` from the model name.
//! The response is consumed as a stream with content and tool-call capture
//! enabled, then folded into a single [`ModelResponse`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent, Tool, ToolCall, ToolResponse};
use genai::Client;

use super::{LanguageModel, Message, ModelResponse, Role, ToolCallRequest, ToolDefinition};
use crate::error::LlmError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);

pub struct GenaiModel {
    client: Client,
    model: String,
    max_attempts: u32,
}

impl GenaiModel {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    async fn complete_once(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        let chat_messages: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();
        let mut chat_req = ChatRequest::new(chat_messages);
        if !tools.is_empty() {
            chat_req = chat_req.with_tools(tools.iter().map(to_tool).collect::<Vec<_>>());
        }

        let chat_options = ChatOptions::default()
            .with_capture_content(true)
            .with_capture_tool_calls(true);

        let stream_res = self
            .client
            .exec_chat_stream(&self.model, chat_req, Some(&chat_options))
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let mut stream = stream_res.stream;
        let mut captured_text: Option<String> = None;
        let mut captured_tool_calls: Vec<ToolCall> = Vec::new();
        let mut ended = false;
        let mut last_error: Option<String> = None;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::End(end)) => {
                    if let Some(text) = end.captured_first_text() {
                        captured_text = Some(text.to_string());
                    }
                    if let Some(calls) = end.captured_tool_calls() {
                        captured_tool_calls = calls.into_iter().cloned().collect();
                    }
                    ended = true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(model = %self.model, error = %e, "LLM stream event error");
                    last_error = Some(e.to_string());
                }
            }
        }

        if !ended {
            return Err(LlmError::Request(
                last_error.unwrap_or_else(|| "stream ended without a final event".to_string()),
            ));
        }

        if captured_text.is_none() && captured_tool_calls.is_empty() {
            return Ok(ModelResponse::default());
        }

        let calls: Vec<ToolCallRequest> = captured_tool_calls
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.call_id,
                name: call.fn_name,
                arguments: call.fn_arguments,
            })
            .collect();
        let text = captured_text.unwrap_or_default();
        let message = if calls.is_empty() {
            Message::assistant(text)
        } else {
            Message::assistant_tool_calls(text, calls)
        };
        Ok(ModelResponse::single(message))
    }
}

#[async_trait]
impl LanguageModel for GenaiModel {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        let mut attempt = 1;
        loop {
            match self.complete_once(messages, tools).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_attempts => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        model = %self.model,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "LLM request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(LlmError::RetriesExhausted {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::User => ChatMessage::user(message.content.clone()),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let calls: Vec<ToolCall> = message
                .tool_calls
                .iter()
                .map(|call| ToolCall {
                    call_id: call.id.clone(),
                    fn_name: call.name.clone(),
                    fn_arguments: call.arguments.clone(),
                    thought_signatures: None,
                })
                .collect();
            ChatMessage::from(calls)
        }
        Role::Assistant => ChatMessage::assistant(message.content.clone()),
        Role::Tool => ToolResponse::new(
            message.tool_call_id.clone().unwrap_or_default(),
            message.content.clone(),
        )
        .into(),
    }
}

fn to_tool(definition: &ToolDefinition) -> Tool {
    Tool::new(definition.name.clone())
        .with_description(definition.description.clone())
        .with_schema(definition.parameters.clone())
}
