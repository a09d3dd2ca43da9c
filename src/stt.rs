//! Voice-note transcription collaborator
//!
//! Posts audio bytes to an OpenAI-compatible transcription endpoint.
//! Unconfigured deployments degrade to a manual-entry hint rather than
//! failing, so `is_configured` must be checked before transcribing.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Settings;

/// Maximum audio payload accepted by the transcription endpoint.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;
/// Transcripts shorter than this are treated as failed recognition.
const MIN_TRANSCRIPT_CHARS: usize = 3;

/// Errors from the transcription collaborator.
#[derive(Error, Debug)]
pub enum SttError {
    /// No API key configured
    #[error("transcription service not configured")]
    NotConfigured,
    /// The transcript came back empty or too short to use
    #[error("transcript unusable")]
    EmptyTranscript,
    /// HTTP failure talking to the transcription endpoint
    #[error("transcription request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result of validating audio before transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioValidation {
    /// Whether the audio may be sent for transcription
    pub valid: bool,
    /// User-facing reason when invalid
    pub error: Option<String>,
}

/// Interface to a speech-to-text engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Whether transcription is available in this deployment.
    fn is_configured(&self) -> bool;
    /// Size/emptiness bounds, checked before transcription.
    fn validate_audio(&self, audio: &[u8]) -> AudioValidation;
    /// Transcribe audio into text.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SttError>;
}

/// Whisper-API transcriber.
pub struct WhisperTranscriber {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperTranscriber {
    /// Build from settings; a missing API key leaves the transcriber
    /// unconfigured.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(settings: &Settings) -> Result<Self, SttError> {
        let http = reqwest::Client::builder()
            .timeout(settings.api_timeout())
            .build()?;
        Ok(Self {
            http,
            api_key: settings.openai_api_key.clone(),
            model: settings.stt_model.clone(),
        })
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn validate_audio(&self, audio: &[u8]) -> AudioValidation {
        if audio.is_empty() {
            return AudioValidation {
                valid: false,
                error: Some("Áudio vazio.".to_string()),
            };
        }
        if audio.len() > MAX_AUDIO_BYTES {
            return AudioValidation {
                valid: false,
                error: Some("Áudio muito grande (máximo 25 MB).".to_string()),
            };
        }
        AudioValidation {
            valid: true,
            error: None,
        }
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String, SttError> {
        let api_key = self.api_key.as_ref().ok_or(SttError::NotConfigured)?;

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.ogg")
            .mime_str("audio/ogg")?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", "pt");

        let response: TranscriptionResponse = self
            .http
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = response.text.trim().to_string();
        if text.chars().count() < MIN_TRANSCRIPT_CHARS {
            return Err(SttError::EmptyTranscript);
        }
        Ok(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transcriber(key: Option<&str>) -> WhisperTranscriber {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        let mut t = WhisperTranscriber::new(&settings).unwrap();
        t.api_key = key.map(str::to_string);
        t
    }

    #[test]
    fn test_unconfigured_without_key() {
        assert!(!transcriber(None).is_configured());
        assert!(!transcriber(Some("")).is_configured());
        assert!(transcriber(Some("sk-test")).is_configured());
    }

    #[test]
    fn test_empty_audio_rejected() {
        let validation = transcriber(Some("sk-test")).validate_audio(&[]);
        assert!(!validation.valid);
        assert!(validation.error.is_some());
    }

    #[test]
    fn test_oversized_audio_rejected() {
        let audio = vec![0u8; MAX_AUDIO_BYTES + 1];
        let validation = transcriber(Some("sk-test")).validate_audio(&audio);
        assert!(!validation.valid);
    }

    #[test]
    fn test_normal_audio_accepted() {
        let validation = transcriber(Some("sk-test")).validate_audio(&[1, 2, 3]);
        assert!(validation.valid);
        assert_eq!(validation.error, None);
    }
}
