//! Muxes narration audio onto a video, tempo-corrected to the video's length.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, VoiceoverError};
use crate::media::{TranscodeRunner, Workspace};
use crate::sync::{build_chain, compute_ratio, FilterChain};

/// Audio codec for the re-encoded narration track.
const AUDIO_CODEC: &str = "aac";

/// Inputs for one merge. Buffers are borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    pub video: &'a [u8],
    pub audio: &'a [u8],
    pub video_duration: Option<f64>,
    pub audio_duration: Option<f64>,
    pub video_extension: Option<&'a str>,
    pub audio_extension: Option<&'a str>,
}

impl<'a> MergeRequest<'a> {
    pub fn new(video: &'a [u8], audio: &'a [u8]) -> Self {
        Self {
            video,
            audio,
            video_duration: None,
            audio_duration: None,
            video_extension: None,
            audio_extension: None,
        }
    }

    pub fn with_durations(mut self, video: Option<f64>, audio: Option<f64>) -> Self {
        self.video_duration = video;
        self.audio_duration = audio;
        self
    }

    pub fn with_extensions(mut self, video: Option<&'a str>, audio: Option<&'a str>) -> Self {
        self.video_extension = video;
        self.audio_extension = audio;
        self
    }
}

/// Bounded wait for the transcoding engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    /// Multiple of the video duration the engine may take.
    pub factor: f64,
    /// Never wait less than this.
    pub floor: Duration,
    /// Used when the video duration is unknown.
    pub fallback: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            factor: 4.0,
            floor: Duration::from_secs(60),
            fallback: Duration::from_secs(600),
        }
    }
}

impl TimeoutPolicy {
    pub fn for_video(&self, video_duration: Option<f64>) -> Duration {
        match video_duration.filter(|d| d.is_finite() && *d > 0.0) {
            Some(secs) => {
                let scaled = secs * self.factor;
                if scaled.is_finite() && scaled > 0.0 {
                    Duration::from_secs_f64(scaled.min(u32::MAX as f64)).max(self.floor)
                } else {
                    self.floor
                }
            }
            None => self.fallback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeStage {
    Received,
    InputsPersisted,
    RatioComputed,
    ChainBuilt,
    Transcoding,
    Succeeded,
    Failed,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStage::Received => "received",
            MergeStage::InputsPersisted => "inputs-persisted",
            MergeStage::RatioComputed => "ratio-computed",
            MergeStage::ChainBuilt => "chain-built",
            MergeStage::Transcoding => "transcoding",
            MergeStage::Succeeded => "succeeded",
            MergeStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Engine arguments: copy the video stream, stretch and re-encode the audio,
/// stop at the shorter stream.
pub fn build_merge_args(
    video: &Path,
    audio: &Path,
    output: &Path,
    chain: &FilterChain,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(20);
    args.push("-y".into());
    args.push("-i".into());
    args.push(video.into());
    args.push("-i".into());
    args.push(audio.into());
    args.push("-filter:a".into());
    args.push(chain.to_filter_expr().into());
    for arg in [
        "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", AUDIO_CODEC, "-shortest",
    ] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

/// Composes workspace, tempo correction and the engine into a single merge.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    runner: TranscodeRunner,
    timeout: TimeoutPolicy,
}

impl Merger {
    pub fn new(runner: TranscodeRunner) -> Self {
        Self {
            runner,
            timeout: TimeoutPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(TranscodeRunner::new(&config.ffmpeg_path)).with_timeout(config.timeout_policy())
    }

    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn runner(&self) -> &TranscodeRunner {
        &self.runner
    }

    /// Merge video and narration into one MP4, returned as bytes.
    ///
    /// The output keeps the original video stream untouched and lasts as long
    /// as the video. Nothing is retried; the scratch directory is gone by the
    /// time this returns.
    pub async fn merge(&self, request: &MergeRequest<'_>) -> Result<Vec<u8>> {
        let started = Instant::now();
        let mut stage = MergeStage::Received;
        debug!(%stage, "Merge request: {} video bytes, {} audio bytes", request.video.len(), request.audio.len());

        if request.video.is_empty() {
            return Err(VoiceoverError::MissingInput("video".to_string()));
        }
        if request.audio.is_empty() {
            return Err(VoiceoverError::MissingInput("audio".to_string()));
        }

        let workspace = Workspace::create(
            request.video,
            request.audio,
            request.video_extension,
            request.audio_extension,
        )
        .await?;
        stage = MergeStage::InputsPersisted;
        debug!(%stage, "Workspace {}", workspace.path().display());

        let ratio = compute_ratio(request.video_duration, request.audio_duration);
        stage = MergeStage::RatioComputed;
        debug!(%stage, "Tempo ratio {}", ratio);

        let chain = build_chain(ratio.value());
        stage = MergeStage::ChainBuilt;
        debug!(%stage, "Audio filter {}", chain);

        let args = build_merge_args(
            workspace.input_video(),
            workspace.input_audio(),
            workspace.output(),
            &chain,
        );
        let timeout = self.timeout.for_video(request.video_duration);
        stage = MergeStage::Transcoding;
        debug!(%stage, "Timeout {:?}", timeout);

        let merged = match self.runner.run(&args, Some(timeout)).await {
            Ok(()) => workspace.read_output().await,
            Err(e) => Err(e),
        };

        match merged {
            Ok(bytes) => {
                stage = MergeStage::Succeeded;
                workspace.close()?;
                info!(
                    %stage,
                    "Merged {} bytes at {} in {:.2}s",
                    bytes.len(),
                    ratio,
                    started.elapsed().as_secs_f64()
                );
                Ok(bytes)
            }
            Err(e) => {
                stage = MergeStage::Failed;
                warn!(%stage, "Merge failed: {e}");
                Err(e)
            }
        }
    }

    /// Merge two files from disk, taking extensions from their names.
    pub async fn merge_files(
        &self,
        video: &Path,
        audio: &Path,
        video_duration: Option<f64>,
        audio_duration: Option<f64>,
    ) -> Result<Vec<u8>> {
        for path in [video, audio] {
            if !path.exists() {
                return Err(VoiceoverError::FileNotFound(path.display().to_string()));
            }
        }

        let (video_bytes, audio_bytes) =
            tokio::try_join!(tokio::fs::read(video), tokio::fs::read(audio))?;
        let video_ext = video.extension().and_then(|e| e.to_str());
        let audio_ext = audio.extension().and_then(|e| e.to_str());

        let request = MergeRequest::new(&video_bytes, &audio_bytes)
            .with_durations(video_duration, audio_duration)
            .with_extensions(video_ext, audio_ext);

        self.merge(&request).await
    }
}
