//! Chat transport boundary.
//!
//! The agent loop only sees [`InboundMessage`]s and the [`MessageSender`],
//! [`Transcriber`] traits; [`telegram::TelegramClient`] and
//! [`transcribe::HttpTranscriber`] are the production implementations.

pub mod telegram;
pub mod transcribe;

use async_trait::async_trait;

/// Chat identifier (Telegram chat id).
pub type ChatId = i64;

/// Maximum characters per outgoing chat message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Emoji used to acknowledge an inbound message.
pub const SEEN_REACTION: &str = "👀";

/// A voice attachment, referenced by transport-specific file id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceNote {
    pub file_id: String,
    pub duration_secs: u32,
}

/// One message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub message_id: i64,
    pub text: Option<String>,
    pub voice: Option<VoiceNote>,
}

impl InboundMessage {
    pub fn text(chat_id: ChatId, message_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            text: Some(text.into()),
            voice: None,
        }
    }
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> anyhow::Result<()>;

    /// Best-effort reaction on a received message.
    async fn react(&self, chat_id: ChatId, message_id: i64, emoji: &str) -> anyhow::Result<()>;
}

/// Fetches the raw bytes of a transport file reference.
#[async_trait]
pub trait FileDownloader: Send + Sync {
    async fn download(&self, file_id: &str) -> anyhow::Result<Vec<u8>>;
}

/// Turns a voice note into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, voice: &VoiceNote) -> anyhow::Result<String>;
}

/// Send `text` to every owner. A failure for one recipient is logged and
/// does not stop delivery to the rest.
pub async fn broadcast(sender: &dyn MessageSender, owners: &[ChatId], text: &str) {
    for &owner in owners {
        if let Err(e) = sender.send(owner, text).await {
            tracing::warn!(chat_id = owner, error = %format!("{e:#}"), "Failed to deliver broadcast");
        }
    }
}
