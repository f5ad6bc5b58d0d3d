use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, VoiceoverError};

/// Duration of an in-memory WAV buffer, read from its header.
pub fn wav_duration(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    // `duration()` counts frames (samples per channel).
    Some(reader.duration() as f64 / spec.sample_rate as f64)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

/// Measures media durations with FFprobe.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    program: PathBuf,
}

impl Default for MediaProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Container duration of `input` in seconds.
    ///
    /// WAV files are measured from their header; everything else goes through FFprobe.
    pub async fn duration(&self, input: &Path) -> Result<f64> {
        if !input.exists() {
            return Err(VoiceoverError::FileNotFound(input.display().to_string()));
        }

        if is_wav(input) {
            let bytes = tokio::fs::read(input).await?;
            if let Some(secs) = wav_duration(&bytes) {
                debug!("{}: {:.3}s (wav header)", input.display(), secs);
                return Ok(secs);
            }
        }

        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                VoiceoverError::Probe(format!(
                    "Failed to run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceoverError::Probe(format!(
                "FFprobe failed: {}",
                stderr.trim()
            )));
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        let secs = parse_duration(&duration_str)?;
        debug!("{}: {:.3}s", input.display(), secs);
        Ok(secs)
    }

    /// Like [`duration`](Self::duration), but a failure just means "unknown".
    pub async fn try_duration(&self, input: &Path) -> Option<f64> {
        match self.duration(input).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                debug!("Could not measure {}: {e}", input.display());
                None
            }
        }
    }
}

fn parse_duration(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    let secs: f64 = trimmed.parse().map_err(|e| {
        VoiceoverError::Probe(format!("Failed to parse duration '{trimmed}': {e}"))
    })?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(VoiceoverError::Probe(format!(
            "Invalid duration '{trimmed}'"
        )));
    }
    Ok(secs)
}
