pub mod elevenlabs;

pub use elevenlabs::{ElevenLabsClient, Voice};

use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub model_id: String,
}

impl SpeechRequest {
    pub fn new(
        text: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            model_id: model_id.into(),
        }
    }
}

/// Text-to-speech backend. The length of the returned audio is up to the
/// service; callers stretch it afterwards.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Encoded audio bytes for `request.text`.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
    fn name(&self) -> &'static str;
    /// File extension of the audio this backend returns.
    fn audio_extension(&self) -> &'static str {
        "mp3"
    }
}
