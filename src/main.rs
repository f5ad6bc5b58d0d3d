use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use voiceover::config::{language_name, Config};
use voiceover::interactive::run_interactive_wizard;
use voiceover::media::MediaProbe;
use voiceover::merge::Merger;
use voiceover::pipeline::{
    derive_output_path, narrate_video_with_cancel, print_summary, PipelineConfig,
    PipelineServices,
};
use voiceover::store::{FsStore, StateStore};
use voiceover::voice::ElevenLabsClient;

#[derive(Parser)]
#[command(name = "voiceover")]
#[command(version, about = "AI narration for videos")]
#[command(
    long_about = "Write a narration for a video with Google Gemini, voice it with ElevenLabs and mux it back in with FFmpeg, stretched to fit.\n\nRun without a subcommand for an interactive wizard."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a narrated copy of a video
    Narrate(NarrateArgs),
    /// Merge an existing narration track into a video
    Merge(MergeArgs),
    /// List the ElevenLabs voices available to your API key
    Voices,
    /// Save a short sample of a voice
    Preview(PreviewArgs),
    /// Delete saved sessions
    ClearSessions,
}

#[derive(Args)]
struct NarrateArgs {
    /// Input video file
    input: PathBuf,

    /// What the narration should explain
    #[arg(short, long)]
    prompt: String,

    /// Output video (defaults to <input>.narrated.mp4)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Narration language code (e.g., en, hi, ja)
    #[arg(short, long)]
    language: Option<String>,

    /// ElevenLabs voice ID
    #[arg(long)]
    voice: Option<String>,

    /// Reuse transcript and audio from an interrupted run
    #[arg(long)]
    resume: bool,

    /// Hide progress spinners
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Input video file
    video: PathBuf,

    /// Narration audio file
    audio: PathBuf,

    /// Output video (defaults to <video>.narrated.mp4)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Video duration in seconds (overrides probing)
    #[arg(long)]
    video_duration: Option<f64>,

    /// Audio duration in seconds (overrides probing)
    #[arg(long)]
    audio_duration: Option<f64>,

    /// Don't measure durations with ffprobe; merge without tempo correction
    /// unless both durations are given
    #[arg(long)]
    no_probe: bool,
}

#[derive(Args)]
struct PreviewArgs {
    /// ElevenLabs voice ID
    voice_id: String,

    /// Text to speak instead of the default sample
    #[arg(long)]
    text: Option<String>,

    /// Where to write the sample (defaults to voice-preview-<id>.mp3)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn install_ctrlc() -> Result<Arc<AtomicBool>> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
        eprintln!("\nCancelling after the current stage... (press Ctrl+C again to abort)");
    })
    .context("Failed to install Ctrl+C handler")?;
    Ok(cancelled)
}

async fn run_narration(
    config: &Config,
    input: &Path,
    output: &Path,
    pipeline_config: PipelineConfig,
) -> Result<()> {
    let services =
        PipelineServices::from_config(config).context("Configuration validation failed")?;
    let cancelled = install_ctrlc()?;

    info!("Input:    {}", input.display());
    info!("Output:   {}", output.display());
    info!(
        "Language: {} ({})",
        language_name(&pipeline_config.language),
        pipeline_config.language
    );
    info!("Voice:    {}", pipeline_config.voice_id);

    let result = narrate_video_with_cancel(input, output, &services, pipeline_config, cancelled)
        .await
        .context("Narration failed")?;

    print_summary(&result);
    Ok(())
}

async fn narrate(config: Config, args: NarrateArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let output = args
        .output
        .unwrap_or_else(|| derive_output_path(&args.input));

    let mut pipeline_config = PipelineConfig::from_config(&config, args.prompt);
    if let Some(language) = args.language {
        pipeline_config.language = language.trim().to_lowercase();
    }
    if let Some(voice) = args.voice {
        pipeline_config.voice_id = voice;
    }
    pipeline_config.resume = args.resume;
    pipeline_config.show_progress = !args.no_progress;

    run_narration(&config, &args.input, &output, pipeline_config).await
}

async fn merge(config: Config, args: MergeArgs) -> Result<()> {
    config
        .validate_media()
        .context("Configuration validation failed")?;

    let probe = MediaProbe::new(&config.ffprobe_path);
    let video_duration = match (args.video_duration, args.no_probe) {
        (Some(secs), _) => Some(secs),
        (None, false) => probe.try_duration(&args.video).await,
        (None, true) => None,
    };
    let audio_duration = match (args.audio_duration, args.no_probe) {
        (Some(secs), _) => Some(secs),
        (None, false) => probe.try_duration(&args.audio).await,
        (None, true) => None,
    };
    if video_duration.is_none() || audio_duration.is_none() {
        warn!("Durations unknown; narration will not be tempo-corrected");
    }

    let output = args
        .output
        .unwrap_or_else(|| derive_output_path(&args.video));

    let merger = Merger::from_config(&config);
    merger
        .runner()
        .check()
        .await
        .context("FFmpeg is not available")?;

    let merged = merger
        .merge_files(&args.video, &args.audio, video_duration, audio_duration)
        .await
        .context("Merge failed")?;

    tokio::fs::write(&output, &merged)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} ({} KB)", output.display(), merged.len() / 1024);
    Ok(())
}

fn elevenlabs(config: &Config) -> Result<ElevenLabsClient> {
    let key = config
        .elevenlabs_api_key
        .clone()
        .filter(|k| !k.is_empty())
        .context("ELEVENLABS_API_KEY not set")?;
    Ok(ElevenLabsClient::new(key))
}

async fn voices(config: Config) -> Result<()> {
    let voices = elevenlabs(&config)?
        .list_voices()
        .await
        .context("Failed to fetch voices")?;

    for voice in &voices {
        let marker = if voice.voice_id == config.default_voice_id {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<24} {:<22} {}",
            marker,
            voice.name,
            voice.voice_id,
            voice.describe()
        );
    }
    println!("\n{} voices (* = default)", voices.len());
    Ok(())
}

async fn preview(config: Config, args: PreviewArgs) -> Result<()> {
    let audio = elevenlabs(&config)?
        .preview(&args.voice_id, args.text.as_deref())
        .await
        .context("Preview failed")?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("voice-preview-{}.mp3", args.voice_id)));
    tokio::fs::write(&output, &audio)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Saved sample to {}", output.display());
    Ok(())
}

async fn clear_sessions() -> Result<()> {
    let store = FsStore::new(Config::session_dir());
    store.clear().await.context("Failed to clear sessions")?;
    info!("Cleared {}", store.root().display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        let wizard = run_interactive_wizard().await?;
        return run_narration(
            &wizard.config,
            &wizard.input,
            &wizard.output,
            wizard.pipeline_config,
        )
        .await;
    };

    let config = Config::load().context("Failed to load configuration")?;

    match command {
        Command::Narrate(args) => narrate(config, args).await,
        Command::Merge(args) => merge(config, args).await,
        Command::Voices => voices(config).await,
        Command::Preview(args) => preview(config, args).await,
        Command::ClearSessions => clear_sessions().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_narrate() {
        let cli = Cli::parse_from([
            "voiceover",
            "narrate",
            "demo.mp4",
            "--prompt",
            "Explain the signup flow",
            "-l",
            "hi",
            "--resume",
        ]);
        match cli.command {
            Some(Command::Narrate(args)) => {
                assert_eq!(args.input, PathBuf::from("demo.mp4"));
                assert_eq!(args.prompt, "Explain the signup flow");
                assert_eq!(args.language.as_deref(), Some("hi"));
                assert!(args.resume);
                assert!(!args.no_progress);
            }
            _ => panic!("expected narrate"),
        }
    }

    #[test]
    fn test_parse_merge_durations() {
        let cli = Cli::parse_from([
            "voiceover",
            "merge",
            "v.mp4",
            "a.mp3",
            "--video-duration",
            "10",
            "--audio-duration",
            "8",
            "-v",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Some(Command::Merge(args)) => {
                assert_eq!(args.video_duration, Some(10.0));
                assert_eq!(args.audio_duration, Some(8.0));
                assert!(!args.no_probe);
            }
            _ => panic!("expected merge"),
        }
    }

    #[test]
    fn test_no_subcommand_runs_wizard() {
        let cli = Cli::parse_from(["voiceover"]);
        assert!(cli.command.is_none());
    }
}
