use crate::error::{Result, VoiceoverError};
use crate::merge::TimeoutPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default ElevenLabs voice ("George").
pub const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

/// Default ElevenLabs synthesis model.
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

/// Default Gemini model for video understanding.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Narration languages offered to the user.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("hi", "Hindi"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("pt", "Portuguese"),
    ("zh", "Chinese"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("ar", "Arabic"),
];

/// Look up the display name of a language code, falling back to the code itself.
pub fn language_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub gemini_model: String,
    pub tts_model: String,
    pub default_voice_id: String,
    pub default_language: String,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Transcoding timeout as a multiple of the video duration.
    pub timeout_factor: f64,
    /// Lower bound for the transcoding timeout, in seconds.
    pub timeout_floor_secs: u64,
    /// Timeout used when the video duration is unknown, in seconds.
    pub timeout_fallback_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            elevenlabs_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
            default_language: "en".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            timeout_factor: 4.0,
            timeout_floor_secs: 60,
            timeout_fallback_secs: 600,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    VoiceoverError::Config(format!(
                        "Failed to parse {}: {e}",
                        config_path.display()
                    ))
                })?;
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from environment-style lookups.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key.trim().to_string());
        }
        if let Some(key) = lookup("ELEVENLABS_API_KEY") {
            self.elevenlabs_api_key = Some(key.trim().to_string());
        }
        if let Some(path) = lookup("VOICEOVER_FFMPEG") {
            self.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("VOICEOVER_FFPROBE") {
            self.ffprobe_path = PathBuf::from(path);
        }
        if let Some(voice) = lookup("VOICEOVER_VOICE") {
            self.default_voice_id = voice;
        }
        if let Some(language) = lookup("VOICEOVER_LANGUAGE") {
            self.default_language = language;
        }
        if let Some(factor) = lookup("VOICEOVER_TIMEOUT_FACTOR") {
            if let Ok(f) = factor.parse() {
                self.timeout_factor = f;
            }
        }
        if let Some(floor) = lookup("VOICEOVER_TIMEOUT_FLOOR") {
            if let Ok(f) = floor.parse() {
                self.timeout_floor_secs = f;
            }
        }
    }

    /// Check the API keys required by the narration pipeline.
    pub fn validate_services(&self) -> Result<()> {
        if self.gemini_api_key.as_deref().map_or(true, str::is_empty) {
            return Err(VoiceoverError::Config(
                "GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey"
                    .to_string(),
            ));
        }
        if self.elevenlabs_api_key.as_deref().map_or(true, str::is_empty) {
            return Err(VoiceoverError::Config(
                "ELEVENLABS_API_KEY not set. Export it with: export ELEVENLABS_API_KEY=..."
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Check the transcoding settings.
    pub fn validate_media(&self) -> Result<()> {
        if !self.timeout_factor.is_finite() || self.timeout_factor <= 0.0 {
            return Err(VoiceoverError::Config(
                "Timeout factor must be a positive number".to_string(),
            ));
        }
        if self.timeout_floor_secs == 0 || self.timeout_fallback_secs == 0 {
            return Err(VoiceoverError::Config(
                "Timeout floor and fallback must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            factor: self.timeout_factor,
            floor: Duration::from_secs(self.timeout_floor_secs),
            fallback: Duration::from_secs(self.timeout_fallback_secs),
        }
    }

    /// Directory holding resumable sessions.
    pub fn session_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("voiceover")
            .join("sessions")
    }

    /// Write the configuration to the user config file, returning its path.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path().ok_or_else(|| {
            VoiceoverError::Config("Could not determine config directory".to_string())
        })?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| VoiceoverError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("voiceover").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_voice_id, DEFAULT_VOICE_ID);
        assert_eq!(config.tts_model, "eleven_multilingual_v2");
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.timeout_factor, 4.0);
        assert!(config.validate_media().is_ok());
    }

    #[test]
    fn test_validate_missing_api_keys() {
        let mut config = Config::default();
        assert!(config.validate_services().is_err());

        config.gemini_api_key = Some("gm-test".to_string());
        assert!(config.validate_services().is_err());

        config.elevenlabs_api_key = Some("el-test".to_string());
        assert!(config.validate_services().is_ok());
    }

    #[test]
    fn test_validate_bad_timeouts() {
        let mut config = Config::default();
        config.timeout_factor = 0.0;
        assert!(config.validate_media().is_err());

        config.timeout_factor = f64::NAN;
        assert!(config.validate_media().is_err());

        config.timeout_factor = 3.0;
        config.timeout_floor_secs = 0;
        assert!(config.validate_media().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ELEVENLABS_API_KEY", "  el-key \n"),
            ("VOICEOVER_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("VOICEOVER_TIMEOUT_FACTOR", "5"),
            ("VOICEOVER_TIMEOUT_FLOOR", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.elevenlabs_api_key.as_deref(), Some("el-key"));
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.timeout_factor, 5.0);
        assert_eq!(config.timeout_floor_secs, 60);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str("timeout_factor = 3.5\ndefault_language = \"ja\"").unwrap();
        assert_eq!(config.timeout_factor, 3.5);
        assert_eq!(config.default_language, "ja");
        assert_eq!(config.timeout_floor_secs, 60);
    }

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("ja"), "Japanese");
        assert_eq!(language_name("HI"), "Hindi");
        assert_eq!(language_name("xx"), "xx");
    }
}
