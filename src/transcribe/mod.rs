use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// Default Groq Whisper endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/audio/transcriptions";

/// whisper-large-v3-turbo for speed and accuracy
pub const DEFAULT_MODEL: &str = "whisper-large-v3-turbo";

#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("failed to open audio file {path}: {source}")]
    ReadAudio {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Speech-to-text provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a local audio file to plain text
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-compatible transcription client (Groq by default)
#[derive(Clone)]
pub struct WhisperTranscriber {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let data = tokio::fs::read(audio_path)
            .await
            .map_err(|source| TranscriptionError::ReadAudio {
                path: audio_path.display().to_string(),
                source,
            })?;

        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        tracing::debug!("Uploading {} bytes for transcription", data.len());

        let part = reqwest::multipart::Part::bytes(data).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: TranscriptionResponse = serde_json::from_str(&body)?;
        Ok(result.text)
    }
}
