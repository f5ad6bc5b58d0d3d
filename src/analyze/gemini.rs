use crate::analyze::{AnalysisRequest, Narration, VideoAnalyzer};
use crate::config::DEFAULT_GEMINI_MODEL;
use crate::error::{ApiErrorKind, Result, VoiceoverError};
use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Gemini REST API root.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Inline payloads above this size are likely to be rejected by the API (20 MB).
const INLINE_SIZE_LIMIT: usize = 20 * 1024 * 1024;

const SERVICE: &str = "Gemini";

/// Google Gemini video-understanding client.
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiAnalyzer {
    /// Create a new analyzer with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a different model (e.g., "gemini-1.5-pro").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Build the narration prompt.
    fn build_prompt(request: &AnalysisRequest<'_>) -> String {
        let language = request.language_name;
        let mut prompt = String::new();

        prompt.push_str("You are an expert video narrator. ");
        prompt.push_str(&format!(
            "The user wants the narration to explain: \"{}\"\n",
            request.goal.trim()
        ));

        if let Some(secs) = request.target_duration.filter(|d| d.is_finite() && *d > 0.0) {
            let whole = secs as u64;
            prompt.push_str(&format!(
                "\nThe video is {:.2} seconds ({}:{:02}) long. Write a narration that takes about {:.0} seconds to speak naturally in {}. Don't rush or drag.\n",
                secs,
                whole / 60,
                whole % 60,
                secs,
                language
            ));
        }

        prompt.push_str(&format!(
            "\nWrite every word in {language} (proper nouns and common technical terms excepted).\n"
        ));
        prompt.push_str("Use an engaging second-person tone that focuses on what the viewer gains.\n");
        prompt.push_str("Spread the sentences evenly across the video.\n\n");
        prompt.push_str("Respond with ONLY a JSON object of this shape:\n");
        prompt.push_str(
            r#"{"transcript": "full narration without timestamps, ready for text-to-speech", "timestamps": [{"time": "00:00", "text": "first sentence"}, {"time": "00:05", "text": "second sentence"}]}"#,
        );
        prompt.push('\n');

        prompt
    }

    /// Pull the narration JSON out of the model's text reply.
    fn parse_narration(text: &str) -> Result<Narration> {
        static FENCE: OnceLock<Regex> = OnceLock::new();
        let fence = FENCE.get_or_init(|| {
            Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?```\s*$").expect("Invalid regex")
        });

        let trimmed = text.trim();
        let body = fence
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(trimmed);

        let narration: Narration = serde_json::from_str(body).map_err(|e| {
            VoiceoverError::MalformedResponse(format!(
                "Gemini reply is not the requested JSON ({e}): {}",
                preview(body, 200)
            ))
        })?;

        if narration.transcript.trim().is_empty() {
            return Err(VoiceoverError::MalformedResponse(
                "Gemini returned an empty transcript".to_string(),
            ));
        }

        Ok(Narration {
            transcript: narration.transcript.trim().to_string(),
            timestamps: narration.timestamps,
        })
    }

    fn error_message(body: &str) -> String {
        serde_json::from_str::<ErrorResponse>(body)
            .ok()
            .and_then(|e| e.error.message)
            .unwrap_or_else(|| body.trim().to_string())
    }
}

/// First `max_chars` characters of `text`, for logs and error messages.
fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl VideoAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Narration> {
        if request.video.is_empty() {
            return Err(VoiceoverError::MissingInput("video".to_string()));
        }
        if request.goal.trim().is_empty() {
            return Err(VoiceoverError::MissingInput("prompt".to_string()));
        }
        if request.video.len() > INLINE_SIZE_LIMIT {
            warn!(
                "Video is {:.1} MB; Gemini may reject inline payloads this large",
                request.video.len() as f64 / 1024.0 / 1024.0
            );
        }

        info!(
            "Analyzing {:.2} MB of {} with {} ({})",
            request.video.len() as f64 / 1024.0 / 1024.0,
            request.mime_type,
            self.model,
            request.language_name
        );

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: Self::build_prompt(request),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: request.mime_type.to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(request.video),
                        },
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.7),
                response_mime_type: Some("application/json".to_string()),
            }),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        debug!("Gemini API response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let kind = ApiErrorKind::from_status(status.as_u16());
            return Err(VoiceoverError::Api {
                service: SERVICE,
                status: status.as_u16(),
                kind,
                message: Self::error_message(&error_body),
            });
        }

        let raw = response.text().await?;
        debug!("Gemini API response: {}", preview(&raw, 500));
        let parsed: GenerateContentResponse = serde_json::from_str(&raw)?;

        let text: String = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(VoiceoverError::MalformedResponse(
                "No response generated from Gemini".to_string(),
            ));
        }

        let narration = Self::parse_narration(&text)?;
        info!(
            "Narration ready: {} characters, {} timed lines",
            narration.transcript.len(),
            narration.timestamps.len()
        );
        Ok(narration)
    }

    fn name(&self) -> &'static str {
        "Google Gemini"
    }
}

// Request/Response types

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}
