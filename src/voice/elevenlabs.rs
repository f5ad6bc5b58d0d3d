use crate::config::{DEFAULT_TTS_MODEL, DEFAULT_VOICE_ID};
use crate::error::{ApiErrorKind, Result, VoiceoverError};
use crate::voice::{SpeechRequest, VoiceSynthesizer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

/// ElevenLabs API root.
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Encoding requested for synthesized speech.
const OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Sentence spoken when previewing a voice.
pub const PREVIEW_TEXT: &str =
    "Hi there! This is how your narration will sound. Let's bring your video to life.";

const SERVICE: &str = "ElevenLabs";

/// A voice available to the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl Voice {
    /// Short human-readable description built from the voice labels.
    pub fn describe(&self) -> String {
        let mut parts: Vec<&str> = ["gender", "accent", "age", "description"]
            .iter()
            .filter_map(|key| self.labels.get(*key).map(String::as_str))
            .collect();
        if parts.is_empty() {
            if let Some(category) = self.category.as_deref() {
                parts.push(category);
            }
        }
        parts.join(", ")
    }
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

#[derive(Serialize)]
struct TextToSpeechBody<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// ElevenLabs text-to-speech client.
pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.trim().to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// List the voices available to this API key.
    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(format!("{}/v1/voices", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let voices = response.json::<VoicesResponse>().await?.voices;
        info!("Fetched {} voices", voices.len());
        Ok(voices)
    }

    /// Synthesize a short sample with the given voice.
    pub async fn preview(&self, voice_id: &str, text: Option<&str>) -> Result<Vec<u8>> {
        let request = SpeechRequest::new(
            text.unwrap_or(PREVIEW_TEXT),
            voice_id,
            DEFAULT_TTS_MODEL,
        );
        self.synthesize(&request).await
    }
}

/// Pull the most specific message out of an ElevenLabs error body.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let detail = &value["detail"];

    detail
        .as_str()
        .or_else(|| detail["message"].as_str())
        .or_else(|| value["message"].as_str())
        .or_else(|| value["error"].as_str())
        .map(str::to_string)
}

fn api_error(status: u16, body: &str) -> VoiceoverError {
    let kind = ApiErrorKind::from_status(status);
    let message = error_detail(body)
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| kind.user_message(SERVICE));

    VoiceoverError::Api {
        service: SERVICE,
        status,
        kind,
        message,
    }
}

#[async_trait]
impl VoiceSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(VoiceoverError::MissingInput("text".to_string()));
        }

        let voice_id = if request.voice_id.trim().is_empty() {
            DEFAULT_VOICE_ID
        } else {
            request.voice_id.trim()
        };
        let model_id = if request.model_id.trim().is_empty() {
            DEFAULT_TTS_MODEL
        } else {
            request.model_id.trim()
        };

        debug!(
            "Synthesizing {} characters with voice {} ({})",
            text.chars().count(),
            voice_id,
            model_id
        );

        let response = self
            .client
            .post(format!(
                "{}/v1/text-to-speech/{}",
                self.base_url, voice_id
            ))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .json(&TextToSpeechBody { text, model_id })
            .send()
            .await?;

        let status = response.status();
        debug!("ElevenLabs API response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let audio = response.bytes().await?.to_vec();
        info!("Synthesized {} bytes of narration audio", audio.len());
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "ElevenLabs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_shapes() {
        assert_eq!(
            error_detail(r#"{"detail": "Text too long"}"#).as_deref(),
            Some("Text too long")
        );
        assert_eq!(
            error_detail(r#"{"detail": {"status": "invalid_api_key", "message": "Invalid API key"}}"#)
                .as_deref(),
            Some("Invalid API key")
        );
        assert_eq!(
            error_detail(r#"{"message": "Quota exceeded"}"#).as_deref(),
            Some("Quota exceeded")
        );
        assert_eq!(error_detail("<html>502</html>"), None);
    }

    #[test]
    fn test_api_error_classification() {
        match api_error(429, "") {
            VoiceoverError::Api { kind, message, .. } => {
                assert_eq!(kind, ApiErrorKind::RateLimited);
                assert!(message.contains("rate limit"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_voice_describe() {
        let voice = Voice {
            voice_id: "abc".to_string(),
            name: "George".to_string(),
            category: Some("premade".to_string()),
            labels: [
                ("accent".to_string(), "british".to_string()),
                ("gender".to_string(), "male".to_string()),
            ]
            .into_iter()
            .collect(),
            preview_url: None,
        };
        assert_eq!(voice.describe(), "male, british");

        let bare = Voice {
            labels: HashMap::new(),
            ..voice
        };
        assert_eq!(bare.describe(), "premade");
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let client = ElevenLabsClient::new("test-key".to_string());
        let request = SpeechRequest::new("  \n", DEFAULT_VOICE_ID, DEFAULT_TTS_MODEL);
        assert!(matches!(
            client.synthesize(&request).await,
            Err(VoiceoverError::MissingInput(_))
        ));
    }
}
