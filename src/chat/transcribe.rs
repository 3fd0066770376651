//! Voice note transcription against an OpenAI-compatible
//! `/audio/transcriptions` endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{FileDownloader, Transcriber, VoiceNote};

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct HttpTranscriber {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    downloader: Arc<dyn FileDownloader>,
}

impl HttpTranscriber {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        downloader: Arc<dyn FileDownloader>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            downloader,
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, voice: &VoiceNote) -> anyhow::Result<String> {
        let audio = self
            .downloader
            .download(&voice.file_id)
            .await
            .context("downloading voice note")?;
        tracing::debug!(file_id = %voice.file_id, bytes = audio.len(), "Transcribing voice note");

        let file = Part::bytes(audio)
            .file_name("voice.ogg")
            .mime_str("audio/ogg")?;
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", file);

        let resp: TranscriptionResponse = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(TRANSCRIBE_TIMEOUT)
            .send()
            .await
            .context("transcription request failed")?
            .error_for_status()
            .context("transcription request rejected")?
            .json()
            .await
            .context("transcription response was not valid JSON")?;

        Ok(resp.text.trim().to_string())
    }
}
