//! Telegram Bot API client: long polling, replies, reactions, file download.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ChatId, FileDownloader, InboundMessage, MessageSender, VoiceNote, MAX_MESSAGE_CHARS};
use crate::orchestration::summary::truncate_chars;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    voice: Option<TgVoice>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgVoice {
    file_id: String,
    #[serde(default)]
    duration: u32,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> anyhow::Result<T> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let resp: ApiResponse<T> = self
            .http
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?
            .json()
            .await
            .with_context(|| format!("Telegram {method} returned invalid JSON"))?;

        if !resp.ok {
            bail!(
                "Telegram {method} failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        resp.result
            .with_context(|| format!("Telegram {method} returned no result"))
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> anyhow::Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
            Duration::from_secs(timeout_secs) + REQUEST_TIMEOUT,
        )
        .await
    }

    /// Long-poll for messages and forward those from `owners` to `tx` until
    /// `cancel` fires or the receiver goes away.
    pub async fn poll_updates(
        &self,
        owners: &[ChatId],
        timeout_secs: u64,
        cancel: CancellationToken,
        tx: mpsc::Sender<InboundMessage>,
    ) {
        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => return,
                updates = self.get_updates(offset, timeout_secs) => updates,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "Telegram polling failed; backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message.and_then(to_inbound) else {
                    continue;
                };
                if !owners.contains(&message.chat_id) {
                    tracing::debug!(chat_id = message.chat_id, "Ignoring message from non-owner chat");
                    continue;
                }
                if tx.send(message).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn to_inbound(message: TgMessage) -> Option<InboundMessage> {
    let text = message.text.or(message.caption);
    let voice = message.voice.map(|v| VoiceNote {
        file_id: v.file_id,
        duration_secs: v.duration,
    });
    if text.is_none() && voice.is_none() {
        return None;
    }
    Some(InboundMessage {
        chat_id: message.chat.id,
        message_id: message.message_id,
        text,
        voice,
    })
}

#[async_trait]
impl MessageSender for TelegramClient {
    async fn send(&self, chat_id: ChatId, text: &str) -> anyhow::Result<()> {
        let text = truncate_chars(text, MAX_MESSAGE_CHARS - 3);
        let _: Value = self
            .call(
                "sendMessage",
                &json!({ "chat_id": chat_id, "text": text }),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    async fn react(&self, chat_id: ChatId, message_id: i64, emoji: &str) -> anyhow::Result<()> {
        let _: Value = self
            .call(
                "setMessageReaction",
                &json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "reaction": [{ "type": "emoji", "emoji": emoji }],
                }),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl FileDownloader for TelegramClient {
    async fn download(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let file: TgFile = self
            .call("getFile", &json!({ "file_id": file_id }), REQUEST_TIMEOUT)
            .await?;
        let path = file
            .file_path
            .with_context(|| format!("Telegram file {file_id} has no download path"))?;
        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, path);
        let bytes = self
            .http
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("Telegram file download failed")?
            .error_for_status()
            .context("Telegram file download rejected")?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
