pub mod gemini;

pub use gemini::GeminiAnalyzer;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One sentence of narration anchored to a point in the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedLine {
    /// `MM:SS` offset into the video.
    pub time: String,
    pub text: String,
}

/// Narration script produced from a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    /// Plain text ready for speech synthesis.
    pub transcript: String,
    #[serde(default)]
    pub timestamps: Vec<TimedLine>,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest<'a> {
    pub video: &'a [u8],
    pub mime_type: &'a str,
    /// What the user wants the narration to explain.
    pub goal: &'a str,
    pub language_code: &'a str,
    pub language_name: &'a str,
    /// Length the spoken narration should roughly fill.
    pub target_duration: Option<f64>,
}

#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<Narration>;
    fn name(&self) -> &'static str;
}

/// MIME type for a video file extension.
pub fn video_mime_type(extension: Option<&str>) -> &'static str {
    match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        Some("3gp") => "video/3gpp",
        _ => "video/mp4",
    }
}
