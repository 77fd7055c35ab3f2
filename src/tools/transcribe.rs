//! Audio transcription via a Whisper-compatible API.
//!
//! Media files referenced by a quiz page are transcribed before reasoning so
//! spoken questions reach the engine as text. Disabled unless a transcription
//! API key is configured.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{FileDownloader, Tool};
use crate::config::Config;

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);

/// Wire shape of a Whisper-compatible transcription response.
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Sends audio files to a Whisper-compatible transcription endpoint.
pub struct AudioTranscriber {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AudioTranscriber {
    /// Build from config; `None` when no transcription key is set.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.transcribe_api_key.clone()?;
        Some(Self::new(
            config.transcribe_api_url.clone(),
            api_key,
            config.transcribe_model.clone(),
        ))
    }

    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TRANSCRIBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url,
            api_key,
            model,
        }
    }

    /// Transcribe one local audio file to text.
    pub async fn transcribe(&self, path: &Path) -> anyhow::Result<String> {
        tracing::info!("Transcribing audio file: {}", path.display());

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("transcription endpoint returned HTTP {}: {}", status, body);
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("unparseable transcription response: {} ({})", e, body))?;

        tracing::info!("Transcription result: {}", parsed.text);
        Ok(parsed.text)
    }
}

/// Download an audio file and return its transcript.
pub struct TranscribeAudio {
    downloader: Arc<FileDownloader>,
    transcriber: Arc<AudioTranscriber>,
}

impl TranscribeAudio {
    pub fn new(downloader: Arc<FileDownloader>, transcriber: Arc<AudioTranscriber>) -> Self {
        Self {
            downloader,
            transcriber,
        }
    }
}

#[async_trait]
impl Tool for TranscribeAudio {
    fn name(&self) -> &str {
        "transcribe_audio"
    }

    fn description(&self) -> &str {
        "Download an audio file referenced by the task page and transcribe it to text. Use when the question is spoken rather than written."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The audio file URL to transcribe"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, scratch_dir: &Path) -> anyhow::Result<String> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;

        let downloaded = self.downloader.download(url, scratch_dir).await?;
        self.transcriber.transcribe(&downloaded.path).await
    }
}
