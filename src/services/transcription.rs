//! Speech-to-text service
//!
//! Voice messages are turned into text before they enter the dialogue. The
//! recognizer itself is an external HTTP service; this module only speaks
//! its small JSON protocol.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use crate::config::settings::TranscriptionConfig;
use crate::utils::errors::{DietBuddyError, Result, TranscriptionError, TranscriptionResult};

/// Converts recorded audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> TranscriptionResult<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcriber backed by an HTTP recognition endpoint
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("DietBuddy-Bot/1.0")
            .build()
            .map_err(DietBuddyError::Http)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: Vec<u8>) -> TranscriptionResult<String> {
        debug!(endpoint = %self.endpoint, bytes = audio.len(), "Sending audio for recognition");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(audio);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TranscriptionError::Timeout
            } else {
                TranscriptionError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            let reason = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::UnsupportedFormat(reason));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::RequestFailed(format!("HTTP {}: {}", status, error_text)));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        info!(chars = body.text.len(), "Audio recognized");
        Ok(body.text)
    }
}

/// Transcriber used when recognition is switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>) -> TranscriptionResult<String> {
        Err(TranscriptionError::Disabled)
    }
}
