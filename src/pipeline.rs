use crate::analyze::{video_mime_type, AnalysisRequest, GeminiAnalyzer, Narration, VideoAnalyzer};
use crate::config::{language_name, Config};
use crate::error::{Result, VoiceoverError};
use crate::media::{wav_duration, MediaProbe};
use crate::merge::{MergeRequest, Merger};
use crate::store::{fingerprint, FsStore, Session, SessionState, StateStore};
use crate::sync::{compute_ratio, TempoRatio};
use crate::voice::{ElevenLabsClient, SpeechRequest, VoiceSynthesizer};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Collaborators the pipeline talks to. Constructed by the caller so tests can
/// substitute fakes.
pub struct PipelineServices {
    pub analyzer: Box<dyn VideoAnalyzer>,
    pub synthesizer: Box<dyn VoiceSynthesizer>,
    pub merger: Merger,
    pub probe: MediaProbe,
    pub store: Option<Arc<dyn StateStore>>,
}

impl PipelineServices {
    /// Real Gemini / ElevenLabs / FFmpeg services from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_services()?;
        config.validate_media()?;

        let gemini_key = config.gemini_api_key.clone().unwrap_or_default();
        let elevenlabs_key = config.elevenlabs_api_key.clone().unwrap_or_default();

        Ok(Self {
            analyzer: Box::new(GeminiAnalyzer::new(gemini_key).with_model(&config.gemini_model)),
            synthesizer: Box::new(ElevenLabsClient::new(elevenlabs_key)),
            merger: Merger::from_config(config),
            probe: MediaProbe::new(&config.ffprobe_path),
            store: Some(Arc::new(FsStore::new(Config::session_dir()))),
        })
    }
}

/// Configuration for one narration run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// What the narration should explain.
    pub goal: String,
    /// Narration language code.
    pub language: String,
    pub voice_id: String,
    pub tts_model: String,
    /// Reuse transcript and audio from an interrupted run with the same inputs.
    pub resume: bool,
    /// Show progress spinners.
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &Config, goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            language: config.default_language.clone(),
            voice_id: config.default_voice_id.clone(),
            tts_model: config.tts_model.clone(),
            resume: false,
            show_progress: true,
        }
    }
}

/// What the user ends up with.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// A single narrated MP4.
    Merged { path: PathBuf },
    /// Muxing failed; video and narration are available separately.
    Unmerged {
        video: PathBuf,
        audio: PathBuf,
        reason: String,
    },
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged { .. })
    }
}

/// Statistics from a narration run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub analysis_time: Duration,
    pub synthesis_time: Duration,
    pub merge_time: Duration,
    pub video_duration: Option<f64>,
    pub audio_duration: Option<f64>,
    pub ratio: TempoRatio,
    /// Stages skipped because a saved session already had their result.
    pub resumed_stages: usize,
}

#[derive(Debug)]
pub struct PipelineResult {
    pub outcome: MergeOutcome,
    pub narration: Narration,
    pub transcript_path: PathBuf,
    pub stats: PipelineStats,
}

#[derive(Serialize)]
struct TranscriptFile<'a> {
    video: &'a Path,
    language: &'a str,
    voice_id: &'a str,
    #[serde(flatten)]
    narration: &'a Narration,
}

fn spinner(multi: Option<&MultiProgress>, message: &str) -> Option<ProgressBar> {
    multi.map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    })
}

fn finish(pb: Option<ProgressBar>, message: String) {
    if let Some(pb) = pb {
        pb.finish_with_message(message);
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> Result<()> {
    if cancelled.load(Ordering::Relaxed) {
        return Err(VoiceoverError::Cancelled);
    }
    Ok(())
}

/// Default output for a video: `<stem>.narrated.mp4` beside the input.
pub fn derive_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{}.narrated.mp4", stem.to_string_lossy()));
    output
}

/// `<dir>/<stem>.<suffix>` next to `output`.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    output.with_file_name(format!("{stem}.{suffix}"))
}

async fn measure_audio(probe: &MediaProbe, audio: &[u8], extension: &str) -> Option<f64> {
    if let Some(secs) = wav_duration(audio) {
        return Some(secs);
    }

    let scratch = tempfile::Builder::new()
        .prefix("narration-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .ok()?;
    tokio::fs::write(scratch.path(), audio).await.ok()?;
    probe.try_duration(scratch.path()).await
}

/// Narrate a video end to end.
///
/// 1. Measures the video
/// 2. Writes a narration script with the video analyzer
/// 3. Synthesizes the narration
/// 4. Stretches and muxes it onto the video
///
/// If muxing fails the run still succeeds with [`MergeOutcome::Unmerged`],
/// leaving a copy of the video and the narration audio next to `output`.
pub async fn narrate_video(
    input: &Path,
    output: &Path,
    services: &PipelineServices,
    pipeline_config: PipelineConfig,
) -> Result<PipelineResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    narrate_video_with_cancel(input, output, services, pipeline_config, cancelled).await
}

/// Narrate a video with cancellation support.
pub async fn narrate_video_with_cancel(
    input: &Path,
    output: &Path,
    services: &PipelineServices,
    pipeline_config: PipelineConfig,
    cancelled: Arc<AtomicBool>,
) -> Result<PipelineResult> {
    let start_time = Instant::now();

    if !input.exists() {
        return Err(VoiceoverError::FileNotFound(input.display().to_string()));
    }
    if pipeline_config.goal.trim().is_empty() {
        return Err(VoiceoverError::MissingInput("prompt".to_string()));
    }

    // Fail before any API call if FFmpeg is unusable.
    services.merger.runner().check().await?;

    let video = tokio::fs::read(input).await?;
    let video_ext = input.extension().and_then(|e| e.to_str());
    let video_fingerprint = fingerprint(&video);

    let multi_progress = pipeline_config.show_progress.then(MultiProgress::new);
    let language = pipeline_config.language.as_str();

    let session = services
        .store
        .as_ref()
        .map(|store| Session::new(store.clone(), input));

    let mut state = match &session {
        Some(session) if pipeline_config.resume => session
            .load()
            .await?
            .filter(|s| {
                s.matches(
                    input,
                    &video_fingerprint,
                    &pipeline_config.goal,
                    language,
                    &pipeline_config.voice_id,
                )
            })
            .unwrap_or_default(),
        Some(session) => {
            session.reset().await?;
            SessionState::default()
        }
        None => SessionState::default(),
    };
    state.video_path = Some(input.to_path_buf());
    state.video_fingerprint = Some(video_fingerprint);
    state.prompt = pipeline_config.goal.clone();
    state.language = language.to_string();
    state.voice_id = Some(pipeline_config.voice_id.clone());

    let mut resumed_stages = 0;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Video understanding
    // ═══════════════════════════════════════════════════════════════════════
    let video_duration = match state.video_duration {
        Some(secs) => Some(secs),
        None => services.probe.try_duration(input).await,
    };
    state.video_duration = video_duration;
    match video_duration {
        Some(secs) => info!("Video duration: {:.2}s", secs),
        None => warn!("Video duration unknown; narration will not be tempo-corrected"),
    }

    check_cancelled(&cancelled)?;

    info!(
        "Stage 1/3: Writing narration with {}",
        services.analyzer.name()
    );
    let analysis_start = Instant::now();

    let narration = match state.transcript.clone() {
        Some(transcript) => {
            info!("Reusing saved transcript ({} characters)", transcript.len());
            resumed_stages += 1;
            Narration {
                transcript,
                timestamps: state.timestamps.clone(),
            }
        }
        None => {
            let pb = spinner(multi_progress.as_ref(), "Analyzing video...");
            let request = AnalysisRequest {
                video: &video,
                mime_type: video_mime_type(video_ext),
                goal: &pipeline_config.goal,
                language_code: language,
                language_name: language_name(language),
                target_duration: video_duration,
            };
            let narration = services.analyzer.analyze(&request).await?;
            finish(
                pb,
                format!("✓ Narration written ({} lines)", narration.timestamps.len()),
            );

            state.transcript = Some(narration.transcript.clone());
            state.timestamps = narration.timestamps.clone();
            if let Some(session) = &session {
                session.save(&state).await?;
            }
            narration
        }
    };
    let analysis_time = analysis_start.elapsed();

    let transcript_path = sibling(output, "transcript.json");
    let transcript_file = TranscriptFile {
        video: input,
        language,
        voice_id: &pipeline_config.voice_id,
        narration: &narration,
    };
    tokio::fs::write(&transcript_path, serde_json::to_vec_pretty(&transcript_file)?).await?;
    debug!("Transcript written to {}", transcript_path.display());

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Voice synthesis
    // ═══════════════════════════════════════════════════════════════════════
    info!(
        "Stage 2/3: Synthesizing narration with {}",
        services.synthesizer.name()
    );
    let synthesis_start = Instant::now();

    let saved_audio = match (&session, state.has_audio) {
        (Some(session), true) => session.load_audio().await?,
        _ => None,
    };

    let audio = match saved_audio {
        Some(audio) => {
            info!("Reusing saved narration audio ({} bytes)", audio.len());
            resumed_stages += 1;
            audio
        }
        None => {
            let pb = spinner(multi_progress.as_ref(), "Generating voice...");
            let request = SpeechRequest::new(
                narration.transcript.clone(),
                pipeline_config.voice_id.clone(),
                pipeline_config.tts_model.clone(),
            );
            let audio = services.synthesizer.synthesize(&request).await?;
            finish(pb, format!("✓ Narration audio ({} KB)", audio.len() / 1024));

            if let Some(session) = &session {
                session.save_audio(&audio).await?;
                state.has_audio = true;
                session.save(&state).await?;
            }
            audio
        }
    };
    let synthesis_time = synthesis_start.elapsed();
    let audio_ext = services.synthesizer.audio_extension();

    let audio_duration = measure_audio(&services.probe, &audio, audio_ext).await;
    let ratio = compute_ratio(video_duration, audio_duration);
    info!(
        "Narration {} vs video {}: tempo {}",
        audio_duration.map_or("unknown".to_string(), |d| format!("{d:.2}s")),
        video_duration.map_or("unknown".to_string(), |d| format!("{d:.2}s")),
        ratio
    );

    check_cancelled(&cancelled)?;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 3: Merge
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 3/3: Merging narration into video");
    let merge_start = Instant::now();
    let pb = spinner(multi_progress.as_ref(), "Merging audio and video...");

    let request = MergeRequest::new(&video, &audio)
        .with_durations(video_duration, audio_duration)
        .with_extensions(video_ext, Some(audio_ext));

    let outcome = match services.merger.merge(&request).await {
        Ok(merged) => {
            tokio::fs::write(output, &merged).await?;
            finish(pb, format!("✓ Narrated video ({} KB)", merged.len() / 1024));
            state.merged_output = Some(output.to_path_buf());
            state.merge_failed = false;
            MergeOutcome::Merged {
                path: output.to_path_buf(),
            }
        }
        Err(e) => {
            let video_path = sibling(output, &format!("original.{}", video_ext.unwrap_or("mp4")));
            let audio_path = sibling(output, &format!("narration.{audio_ext}"));
            tokio::try_join!(
                tokio::fs::write(&video_path, &video),
                tokio::fs::write(&audio_path, &audio)
            )?;
            finish(pb, "✗ Merge failed, keeping video and narration separate".to_string());
            warn!("Merge failed: {e}");
            state.merge_failed = true;
            MergeOutcome::Unmerged {
                video: video_path,
                audio: audio_path,
                reason: e.to_string(),
            }
        }
    };
    let merge_time = merge_start.elapsed();

    if let Some(session) = &session {
        session.save(&state).await?;
    }

    Ok(PipelineResult {
        outcome,
        narration,
        transcript_path,
        stats: PipelineStats {
            total_time: start_time.elapsed(),
            analysis_time,
            synthesis_time,
            merge_time,
            video_duration,
            audio_duration,
            ratio,
            resumed_stages,
        },
    })
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    let fmt_secs = |d: Option<f64>| d.map_or("unknown".to_string(), |d| format!("{d:.1}s"));

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    match &result.outcome {
        MergeOutcome::Merged { .. } => {
            println!("                      Narration Complete                        ")
        }
        MergeOutcome::Unmerged { .. } => {
            println!("              Narration Ready (merge failed)                    ")
        }
    }
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    match &result.outcome {
        MergeOutcome::Merged { path } => {
            println!("  Output:     {}", path.display());
        }
        MergeOutcome::Unmerged {
            video,
            audio,
            reason,
        } => {
            println!("  Video:      {}", video.display());
            println!("  Narration:  {}", audio.display());
            println!();
            println!("  Could not combine them: {reason}");
            println!("  Play both files together to hear the narration over the video.");
        }
    }
    println!("  Transcript: {}", result.transcript_path.display());
    println!(
        "  Duration:   video {}, narration {} (tempo {})",
        fmt_secs(result.stats.video_duration),
        fmt_secs(result.stats.audio_duration),
        result.stats.ratio
    );
    println!();
    println!("  Timing:");
    println!(
        "    Analyze:     {:.2}s",
        result.stats.analysis_time.as_secs_f64()
    );
    println!(
        "    Synthesize:  {:.2}s",
        result.stats.synthesis_time.as_secs_f64()
    );
    println!(
        "    Merge:       {:.2}s",
        result.stats.merge_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    if result.stats.resumed_stages > 0 {
        println!();
        println!(
            "  Note: {} stage(s) reused from a saved session",
            result.stats.resumed_stages
        );
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
