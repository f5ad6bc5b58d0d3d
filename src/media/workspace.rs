use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{Result, VoiceoverError};

const DIR_PREFIX: &str = "merge-av-";
const OUTPUT_FILE: &str = "output.mp4";

/// Per-request scratch directory for one merge.
///
/// Holds the two materialized inputs and the declared output path. The
/// directory and everything in it are removed when the workspace is dropped,
/// whichever way the merge ends.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    input_video: PathBuf,
    input_audio: PathBuf,
    output: PathBuf,
}

/// Keep only the alphanumeric part of a caller-supplied extension.
fn sanitize_extension(ext: Option<&str>) -> Option<String> {
    let cleaned: String = ext?
        .trim()
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    (!cleaned.is_empty()).then_some(cleaned)
}

fn file_name(stem: &str, ext: Option<&str>) -> String {
    match sanitize_extension(ext) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

impl Workspace {
    /// Create a fresh directory under the system temp root and write both inputs into it.
    pub async fn create(
        video: &[u8],
        audio: &[u8],
        video_ext: Option<&str>,
        audio_ext: Option<&str>,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(DIR_PREFIX)
            .tempdir()
            .map_err(|e| {
                VoiceoverError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create temp directory: {e}"),
                ))
            })?;

        let input_video = dir.path().join(file_name("input-video", video_ext));
        let input_audio = dir.path().join(file_name("input-audio", audio_ext));
        let output = dir.path().join(OUTPUT_FILE);

        // On a write error `dir` is dropped here and takes the partial files with it.
        tokio::try_join!(
            tokio::fs::write(&input_video, video),
            tokio::fs::write(&input_audio, audio),
        )?;

        debug!(
            "Workspace {} holds {} video bytes, {} audio bytes",
            dir.path().display(),
            video.len(),
            audio.len()
        );

        Ok(Self {
            dir,
            input_video,
            input_audio,
            output,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_video(&self) -> &Path {
        &self.input_video
    }

    pub fn input_audio(&self) -> &Path {
        &self.input_audio
    }

    /// Where the engine is told to write. Not created by the workspace.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Read the engine's output back into memory.
    pub async fn read_output(&self) -> Result<Vec<u8>> {
        if !self.output.exists() {
            return Err(VoiceoverError::Merge(
                "Output file was not created".to_string(),
            ));
        }
        Ok(tokio::fs::read(&self.output).await?)
    }

    /// Remove the directory now, reporting any failure instead of ignoring it.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed workspace {}", path.display());
        Ok(())
    }
}
