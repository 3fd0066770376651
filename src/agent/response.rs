//! Structured agent responses and the tolerant parser for model output.
//!
//! The model is asked to answer with `{"type": "...", "content": "..."}`.
//! Models do not always comply, so parsing falls back in three tiers:
//!
//! 1. the whole text is the JSON object;
//! 2. the first balanced `{...}` inside the text is the JSON object;
//! 3. the raw text is wrapped verbatim as a `message`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Spoken to the user and kept in history.
    Message,
    /// Internal reasoning; never sent.
    Think,
    /// Nothing to do.
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default)]
    pub content: String,
}

impl AgentResponse {
    /// Canonical JSON form, as stored in history.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.content.clone())
    }
}

pub fn parse_agent_response(raw: &str) -> AgentResponse {
    if let Ok(parsed) = serde_json::from_str::<AgentResponse>(raw.trim()) {
        return parsed;
    }

    if let Some(embedded) = first_json_object(raw) {
        if let Ok(parsed) = serde_json::from_str::<AgentResponse>(embedded) {
            return parsed;
        }
    }

    AgentResponse {
        kind: ResponseKind::Message,
        content: raw.to_string(),
    }
}

/// The first balanced `{...}` substring, honoring JSON string quoting so
/// braces inside string literals do not count.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
